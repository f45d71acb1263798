//! Shared harness: fixture builders plus a reference interpreter for the
//! symbolic instruction IR, so woven streams can actually be executed.
#![allow(dead_code)]

use jweave::jvm::code::{FieldRef, Insn, InsnStream, UnitRef};
use jweave::jvm::{
    ClassHierarchy, ClassName, ConstValue, FieldType, LocalKind, MethodAccessFlags, MethodShape,
};
use jweave::weave::binding::{AdviceParam, Phase};
use jweave::weave::control::AdviceControl;
use jweave::weave::descriptor::{AdviceBody, AdviceDescriptor};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub const TARGET_CLASS: &str = "com/example/Target";

/// Runtime value in the interpreter
#[derive(Clone, Debug)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Ref(Option<Rc<RefCell<Obj>>>),
}

impl Value {
    pub fn width(&self) -> usize {
        match self {
            Value::Long(_) | Value::Double(_) => 2,
            _ => 1,
        }
    }

    pub fn is_default(&self) -> bool {
        match self {
            Value::Int(i) => *i == 0,
            Value::Long(l) => *l == 0,
            Value::Float(f) => *f == 0.0,
            Value::Double(d) => *d == 0.0,
            Value::Ref(r) => r.is_none(),
        }
    }

    pub fn as_int(&self) -> i32 {
        match self {
            Value::Int(i) => *i,
            other => panic!("expected an int, found {:?}", other),
        }
    }

    pub fn as_long(&self) -> i64 {
        match self {
            Value::Long(l) => *l,
            other => panic!("expected a long, found {:?}", other),
        }
    }

    pub fn as_float(&self) -> f32 {
        match self {
            Value::Float(f) => *f,
            other => panic!("expected a float, found {:?}", other),
        }
    }

    pub fn as_double(&self) -> f64 {
        match self {
            Value::Double(d) => *d,
            other => panic!("expected a double, found {:?}", other),
        }
    }

    pub fn as_obj(&self) -> Rc<RefCell<Obj>> {
        match self {
            Value::Ref(Some(obj)) => Rc::clone(obj),
            other => panic!("expected a non-null reference, found {:?}", other),
        }
    }

    pub fn of_const(value: ConstValue) -> Value {
        match value {
            ConstValue::Int(i) => Value::Int(i),
            ConstValue::Long(l) => Value::Long(l),
            ConstValue::Float(f) => Value::Float(f),
            ConstValue::Double(d) => Value::Double(d),
            ConstValue::Null => Value::Ref(None),
        }
    }

    pub fn default_of(ty: &FieldType) -> Value {
        Value::of_const(ty.default_const())
    }
}

/// Heap object: a plain instance, an array, or a boxed primitive
#[derive(Debug, Default)]
pub struct Obj {
    pub class: String,
    pub fields: HashMap<String, Value>,
    pub array: Option<Vec<Value>>,
    pub boxed: Option<Value>,
}

pub fn instance(class: &ClassName) -> Value {
    Value::Ref(Some(Rc::new(RefCell::new(Obj {
        class: class.as_str().to_owned(),
        ..Obj::default()
    }))))
}

/// How a call ended
#[derive(Debug)]
pub enum Outcome {
    Return(Option<Value>),
    Thrown(Rc<RefCell<Obj>>),
}

impl Outcome {
    pub fn returned(self) -> Option<Value> {
        match self {
            Outcome::Return(value) => value,
            Outcome::Thrown(obj) => panic!("unexpected throw of {}", obj.borrow().class),
        }
    }

    pub fn thrown(self) -> Rc<RefCell<Obj>> {
        match self {
            Outcome::Thrown(obj) => obj,
            Outcome::Return(value) => panic!("expected a throw, returned {:?}", value),
        }
    }
}

/// A separately invocable unit, for the delegating strategy
pub struct Unit {
    pub parameters: Vec<FieldType>,
    pub stream: InsnStream,
}

/// Reference interpreter over the instruction IR
///
/// Statics double as explicit, inspectable test state (counters for repeat
/// tests, observation slots for round trips).
pub struct Machine<'g> {
    pub hierarchy: &'g ClassHierarchy<'g>,
    pub statics: RefCell<HashMap<String, Value>>,
    pub units: HashMap<String, Unit>,
}

impl<'g> Machine<'g> {
    pub fn new(hierarchy: &'g ClassHierarchy<'g>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Machine {
            hierarchy,
            statics: RefCell::new(HashMap::new()),
            units: HashMap::new(),
        }
    }

    pub fn define_unit(&mut self, unit: &UnitRef, stream: InsnStream) {
        self.units.insert(
            unit.name.clone(),
            Unit {
                parameters: unit.parameters.clone(),
                stream,
            },
        );
    }

    pub fn set_static(&self, name: &str, value: Value) {
        self.statics.borrow_mut().insert(name.to_owned(), value);
    }

    pub fn static_value(&self, name: &str) -> Option<Value> {
        self.statics.borrow().get(name).cloned()
    }

    fn read_static(&self, field: &FieldRef) -> Value {
        self.statics
            .borrow()
            .get(&field.name)
            .cloned()
            .unwrap_or_else(|| Value::default_of(&field.ty))
    }

    pub fn call(&self, stream: &InsnStream, max_locals: u16, args: Vec<Value>) -> Outcome {
        let size = (max_locals.max(stream.local_span()) as usize) + 8;
        let mut locals = vec![Value::Ref(None); size];
        let mut slot = 0usize;
        for arg in args {
            let width = arg.width();
            locals[slot] = arg;
            slot += width;
        }

        let mut stack: Vec<Value> = vec![];
        let mut pc = 0usize;
        let mut steps = 0u32;

        macro_rules! raise {
            ($obj:expr) => {{
                let obj = $obj;
                let mut caught = None;
                for handler in &stream.handlers {
                    if handler.start.0 <= pc && pc < handler.end.0 {
                        let matches = match &handler.catch_type {
                            None => true,
                            Some(catch) => self.hierarchy.is_class_assignable(
                                &ClassName::new(obj.borrow().class.clone()),
                                catch,
                            ),
                        };
                        if matches {
                            caught = Some(handler.handler);
                            break;
                        }
                    }
                }
                match caught {
                    Some(target) => {
                        stack.clear();
                        stack.push(Value::Ref(Some(obj)));
                        pc = target.0;
                        continue;
                    }
                    None => return Outcome::Thrown(obj),
                }
            }};
        }

        loop {
            steps += 1;
            assert!(steps < 100_000, "interpreter step limit at @{}", pc);
            assert!(pc < stream.insns.len(), "fell off the end at @{}", pc);

            match &stream.insns[pc] {
                Insn::Nop => {}
                Insn::Const(value) => stack.push(Value::of_const(*value)),
                Insn::Load(_, slot) => stack.push(locals[*slot as usize].clone()),
                Insn::Store(_, slot) => {
                    let value = stack.pop().expect("store underflow");
                    locals[*slot as usize] = value;
                }
                Insn::Pop => {
                    stack.pop().expect("pop underflow");
                }
                Insn::Dup => {
                    let top = stack.last().expect("dup underflow").clone();
                    stack.push(top);
                }
                Insn::Add(_) => {
                    let b = stack.pop().expect("add underflow");
                    let a = stack.pop().expect("add underflow");
                    stack.push(match (a, b) {
                        (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(b)),
                        (Value::Long(a), Value::Long(b)) => Value::Long(a.wrapping_add(b)),
                        (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
                        (Value::Double(a), Value::Double(b)) => Value::Double(a + b),
                        (a, b) => panic!("bad add operands {:?} {:?}", a, b),
                    });
                }
                Insn::IntLt => {
                    let b = stack.pop().expect("lt underflow").as_int();
                    let a = stack.pop().expect("lt underflow").as_int();
                    stack.push(Value::Int((a < b) as i32));
                }
                Insn::Widen { to, .. } => {
                    let value = stack.pop().expect("widen underflow");
                    let widened = match (value, to.local_kind()) {
                        (Value::Int(i), LocalKind::Int) => Value::Int(i),
                        (Value::Int(i), LocalKind::Long) => Value::Long(i as i64),
                        (Value::Int(i), LocalKind::Float) => Value::Float(i as f32),
                        (Value::Int(i), LocalKind::Double) => Value::Double(i as f64),
                        (Value::Long(l), LocalKind::Float) => Value::Float(l as f32),
                        (Value::Long(l), LocalKind::Double) => Value::Double(l as f64),
                        (Value::Float(f), LocalKind::Double) => Value::Double(f as f64),
                        (value, kind) => panic!("bad widen {:?} to {:?}", value, kind),
                    };
                    stack.push(widened);
                }
                Insn::BoxPrim(base) => {
                    let value = stack.pop().expect("box underflow");
                    stack.push(Value::Ref(Some(Rc::new(RefCell::new(Obj {
                        class: base.boxed().as_str().to_owned(),
                        boxed: Some(value),
                        ..Obj::default()
                    })))));
                }
                Insn::UnboxPrim(_) => {
                    let obj = stack.pop().expect("unbox underflow").as_obj();
                    let inner = obj.borrow().boxed.clone().expect("unboxed a non-box");
                    stack.push(inner);
                }
                Insn::CheckCast(_) => {
                    // Types were already checked by the recomputation pass
                }
                Insn::NewArray(element) => {
                    let length = stack.pop().expect("newarray underflow").as_int();
                    stack.push(Value::Ref(Some(Rc::new(RefCell::new(Obj {
                        array: Some(vec![Value::default_of(element); length as usize]),
                        ..Obj::default()
                    })))));
                }
                Insn::ArrayLoad(_) => {
                    let index = stack.pop().expect("aload underflow").as_int();
                    let array = stack.pop().expect("aload underflow").as_obj();
                    let value = array.borrow().array.as_ref().expect("not an array")
                        [index as usize]
                        .clone();
                    stack.push(value);
                }
                Insn::ArrayStore(_) => {
                    let value = stack.pop().expect("astore underflow");
                    let index = stack.pop().expect("astore underflow").as_int();
                    let array = stack.pop().expect("astore underflow").as_obj();
                    array.borrow_mut().array.as_mut().expect("not an array")[index as usize] =
                        value;
                }
                Insn::GetField(field) => {
                    let obj = stack.pop().expect("getfield underflow").as_obj();
                    let value = obj
                        .borrow()
                        .fields
                        .get(&field.name)
                        .cloned()
                        .unwrap_or_else(|| Value::default_of(&field.ty));
                    stack.push(value);
                }
                Insn::PutField(field) => {
                    let value = stack.pop().expect("putfield underflow");
                    let obj = stack.pop().expect("putfield underflow").as_obj();
                    obj.borrow_mut().fields.insert(field.name.clone(), value);
                }
                Insn::GetStatic(field) => stack.push(self.read_static(field)),
                Insn::PutStatic(field) => {
                    let value = stack.pop().expect("putstatic underflow");
                    self.statics.borrow_mut().insert(field.name.clone(), value);
                }
                Insn::New(class) => stack.push(instance(class)),
                Insn::Invoke(unit_ref) => {
                    let unit = self
                        .units
                        .get(&unit_ref.name)
                        .unwrap_or_else(|| panic!("undefined unit {}", unit_ref.name));
                    let mut args = vec![];
                    for _ in 0..unit.parameters.len() {
                        args.push(stack.pop().expect("invoke underflow"));
                    }
                    args.reverse();
                    let max_locals = unit.stream.local_span();
                    match self.call(&unit.stream, max_locals, args) {
                        Outcome::Return(Some(value)) => stack.push(value),
                        Outcome::Return(None) => {}
                        Outcome::Thrown(obj) => raise!(obj),
                    }
                }
                Insn::Goto(target) => {
                    pc = target.0;
                    continue;
                }
                Insn::Branch { test, target, .. } => {
                    let value = stack.pop().expect("branch underflow");
                    let fire = match test {
                        jweave::jvm::code::ValueTest::IsDefault => value.is_default(),
                        jweave::jvm::code::ValueTest::IsNonDefault => !value.is_default(),
                    };
                    if fire {
                        pc = target.0;
                        continue;
                    }
                }
                Insn::Return(None) => return Outcome::Return(None),
                Insn::Return(Some(_)) => {
                    let value = stack.pop().expect("return underflow");
                    return Outcome::Return(Some(value));
                }
                Insn::Throw => {
                    let obj = stack.pop().expect("throw underflow").as_obj();
                    raise!(obj)
                }
            }
            pc += 1;
        }
    }
}

// Fixture builders

pub fn static_shape(
    parameters: Vec<FieldType>,
    return_type: Option<FieldType>,
    max_locals: u16,
) -> MethodShape {
    MethodShape {
        class: ClassName::new(TARGET_CLASS),
        name: String::from("sample"),
        access: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        parameters,
        return_type,
        throws: vec![],
        max_locals,
    }
}

pub fn instance_shape(
    parameters: Vec<FieldType>,
    return_type: Option<FieldType>,
    max_locals: u16,
) -> MethodShape {
    MethodShape {
        access: MethodAccessFlags::PUBLIC,
        ..static_shape(parameters, return_type, max_locals)
    }
}

pub fn static_field(name: &str, ty: FieldType) -> FieldRef {
    FieldRef {
        owner: ClassName::new(TARGET_CLASS),
        name: name.to_owned(),
        ty,
    }
}

pub fn advice_body(
    phase: Phase,
    params: Vec<AdviceParam>,
    return_type: Option<FieldType>,
    insns: Vec<Insn>,
    control: AdviceControl,
) -> AdviceBody {
    let name = match phase {
        Phase::Enter => "com/example/Advice.enter",
        Phase::Exit => "com/example/Advice.exit",
    };
    AdviceBody {
        phase,
        unit: UnitRef {
            name: String::from(name),
            parameters: params.iter().map(|param| param.ty.clone()).collect(),
            return_type,
        },
        access: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        params,
        stream: InsnStream::new(insns),
        control,
    }
}

pub fn descriptor(name: &str, bodies: Vec<AdviceBody>) -> AdviceDescriptor {
    AdviceDescriptor::new(name, bodies).expect("fixture descriptor is well formed")
}
