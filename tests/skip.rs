//! Skip directives: the enter value decides whether the original body runs,
//! and a skipped body leaves the default return value behind.

mod common;

use common::*;
use jweave::jvm::code::{Insn, InsnStream};
use jweave::jvm::{ClassHierarchy, ClassName, ConstValue, FieldType, HierarchyArenas, LocalKind};
use jweave::weave::control::{AdviceControl, DefaultTest, SkipSpec};
use jweave::weave::binding::Phase;
use jweave::{BindError, DispatchStrategy, TargetMethod, Weaver};

/// static int sample() { executed = 1; return 7; }
fn observable_target() -> TargetMethod {
    TargetMethod {
        shape: static_shape(vec![], Some(FieldType::int()), 0),
        stream: InsnStream::new(vec![
            Insn::Const(ConstValue::Int(1)),
            Insn::PutStatic(static_field("executed", FieldType::int())),
            Insn::Const(ConstValue::Int(7)),
            Insn::Return(Some(LocalKind::Int)),
        ]),
    }
}

fn skip_control(test: DefaultTest, index: Option<u16>) -> AdviceControl {
    AdviceControl {
        skip: Some(SkipSpec { test, index }),
        ..AdviceControl::default()
    }
}

fn run_skip(flag: i32, strategy: DispatchStrategy) -> (Option<Value>, Option<Value>) {
    let arenas = HierarchyArenas::new();
    let hierarchy = ClassHierarchy::new(&arenas);
    let weaver = Weaver::new(&hierarchy);

    let enter = advice_body(
        Phase::Enter,
        vec![],
        Some(FieldType::int()),
        vec![
            Insn::Const(ConstValue::Int(flag)),
            Insn::Return(Some(LocalKind::Int)),
        ],
        skip_control(DefaultTest::OnNonDefault, None),
    );
    let descriptor = descriptor("skip", vec![enter]);

    let target = observable_target();
    let woven = weaver.weave(&descriptor, strategy, &target).unwrap();

    let mut machine = Machine::new(&hierarchy);
    if strategy == DispatchStrategy::Delegating {
        let body = descriptor.enter().unwrap();
        machine.define_unit(&body.unit, body.stream.clone());
    }
    let returned = machine.call(&woven.stream, woven.max_locals, vec![]).returned();
    (returned, machine.static_value("executed"))
}

#[test]
fn nonzero_enter_value_skips_the_body() {
    for strategy in [DispatchStrategy::Inlining, DispatchStrategy::Delegating] {
        let (returned, executed) = run_skip(1, strategy);
        assert_eq!(returned.unwrap().as_int(), 0);
        assert!(executed.is_none());
    }
}

#[test]
fn zero_enter_value_runs_the_body() {
    for strategy in [DispatchStrategy::Inlining, DispatchStrategy::Delegating] {
        let (returned, executed) = run_skip(0, strategy);
        assert_eq!(returned.unwrap().as_int(), 7);
        assert_eq!(executed.unwrap().as_int(), 1);
    }
}

#[test]
fn on_true_requires_a_boolean_and_fires_on_true() {
    let arenas = HierarchyArenas::new();
    let hierarchy = ClassHierarchy::new(&arenas);
    let weaver = Weaver::new(&hierarchy);

    for (flag, expect_skip) in [(1, true), (0, false)] {
        let enter = advice_body(
            Phase::Enter,
            vec![],
            Some(FieldType::boolean()),
            vec![
                Insn::Const(ConstValue::Int(flag)),
                Insn::Return(Some(LocalKind::Int)),
            ],
            skip_control(DefaultTest::OnTrue, None),
        );
        let descriptor = descriptor("skip-on-true", vec![enter]);

        let target = observable_target();
        let woven = weaver
            .weave(&descriptor, DispatchStrategy::Inlining, &target)
            .unwrap();

        let machine = Machine::new(&hierarchy);
        let returned = machine
            .call(&woven.stream, woven.max_locals, vec![])
            .returned()
            .unwrap()
            .as_int();
        if expect_skip {
            assert_eq!(returned, 0);
            assert!(machine.static_value("executed").is_none());
        } else {
            assert_eq!(returned, 7);
        }
    }
}

#[test]
fn indexed_skip_tests_one_array_element() {
    let arenas = HierarchyArenas::new();
    let hierarchy = ClassHierarchy::new(&arenas);
    let weaver = Weaver::new(&hierarchy);

    for (flag, expect_skip) in [(5, true), (0, false)] {
        // static int[] enter() { return new int[] { flag, 0 }; }
        let enter = advice_body(
            Phase::Enter,
            vec![],
            Some(FieldType::array(FieldType::int())),
            vec![
                Insn::Const(ConstValue::Int(2)),
                Insn::NewArray(FieldType::int()),
                Insn::Dup,
                Insn::Const(ConstValue::Int(0)),
                Insn::Const(ConstValue::Int(flag)),
                Insn::ArrayStore(LocalKind::Int),
                Insn::Return(Some(LocalKind::Reference)),
            ],
            skip_control(DefaultTest::OnNonDefault, Some(0)),
        );
        let descriptor = descriptor("skip-indexed", vec![enter]);

        let target = observable_target();
        let woven = weaver
            .weave(&descriptor, DispatchStrategy::Inlining, &target)
            .unwrap();

        let machine = Machine::new(&hierarchy);
        let returned = machine
            .call(&woven.stream, woven.max_locals, vec![])
            .returned()
            .unwrap()
            .as_int();
        assert_eq!(returned, if expect_skip { 0 } else { 7 });
    }
}

#[test]
fn skip_on_a_body_that_never_returns_is_rejected() {
    let arenas = HierarchyArenas::new();
    let hierarchy = ClassHierarchy::new(&arenas);
    let weaver = Weaver::new(&hierarchy);

    let enter = advice_body(
        Phase::Enter,
        vec![],
        Some(FieldType::int()),
        vec![
            Insn::Const(ConstValue::Int(1)),
            Insn::Return(Some(LocalKind::Int)),
        ],
        skip_control(DefaultTest::OnNonDefault, None),
    );
    let descriptor = descriptor("skip-never-returns", vec![enter]);

    // static void sample() { throw new RuntimeException(); }
    let target = TargetMethod {
        shape: static_shape(vec![], None, 0),
        stream: InsnStream::new(vec![
            Insn::New(ClassName::RUNTIME_EXCEPTION),
            Insn::Throw,
        ]),
    };
    let result = weaver.weave(&descriptor, DispatchStrategy::Inlining, &target);
    assert!(matches!(
        result.unwrap_err(),
        jweave::WeaveError::Bind(BindError::SkipOnNeverReturning)
    ));
}
