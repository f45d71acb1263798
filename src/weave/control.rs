use crate::jvm::code::ValueTest;
use crate::jvm::{ClassName, FieldType, LocalKind};
use crate::weave::errors::BindError;

/// Predicate an advice body declares over its own produced value
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DefaultTest {
    /// The value is a boolean and it is true
    OnTrue,
    /// Zero, false, or null
    OnDefault,
    OnNonDefault,
}

/// Enter-phase request to jump over the original body
#[derive(Clone, PartialEq, Debug)]
pub struct SkipSpec {
    pub test: DefaultTest,
    /// Test an element of an array-valued enter result instead of the
    /// result itself
    pub index: Option<u16>,
}

/// Exit-phase request to run the instrumented region again
#[derive(Clone, PartialEq, Debug)]
pub struct RepeatSpec {
    pub test: DefaultTest,
    /// Snapshot the arguments before the first iteration and restore them
    /// on every repeat
    pub backup_arguments: bool,
}

/// Control-flow directives declared on one advice body
///
/// Which directives are legal on which phase is enforced when the
/// descriptor is built.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct AdviceControl {
    pub skip: Option<SkipSpec>,
    pub repeat: Option<RepeatSpec>,
    /// Throwables of this type raised inside the advice body are swallowed
    pub suppress: Option<ClassName>,
    /// Run the exit phase on the exceptional path too, for throwables of
    /// this type
    pub on_throwable: Option<ClassName>,
}

/// A [`DefaultTest`] resolved against the concrete advised value
#[derive(Clone, PartialEq, Debug)]
pub struct ResolvedPredicate {
    pub test: ValueTest,
    /// Category of the tested value (the element, when indexed)
    pub kind: LocalKind,
    /// Element index and category for array-indexed predicates
    pub index: Option<u16>,
}

/// Combined, per-target control plan consumed once during emission
#[derive(Clone, PartialEq, Debug, Default)]
pub struct DispatchDirective {
    pub skip: Option<ResolvedPredicate>,
    pub repeat: Option<ResolvedPredicate>,
    pub backup_arguments: bool,
    pub suppress_enter: Option<ClassName>,
    pub suppress_exit: Option<ClassName>,
    pub on_throwable: Option<ClassName>,
}

/// Resolve a declared predicate against the type of the advised value
pub fn resolve_predicate(
    test: DefaultTest,
    index: Option<u16>,
    value: &FieldType,
) -> Result<ResolvedPredicate, BindError> {
    let tested = match index {
        Some(_) => match value {
            FieldType::Array(element) => (**element).clone(),
            other => {
                return Err(BindError::PredicateNotIndexable {
                    found: other.clone(),
                })
            }
        },
        None => value.clone(),
    };
    let test = match test {
        DefaultTest::OnTrue => {
            if tested != FieldType::boolean() {
                return Err(BindError::PredicateTypeMismatch { found: tested });
            }
            ValueTest::IsNonDefault
        }
        DefaultTest::OnDefault => ValueTest::IsDefault,
        DefaultTest::OnNonDefault => ValueTest::IsNonDefault,
    };
    Ok(ResolvedPredicate {
        test,
        kind: tested.local_kind(),
        index,
    })
}
