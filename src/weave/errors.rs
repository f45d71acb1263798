use crate::jvm::code::InsnIdx;
use crate::jvm::frame::{FrameSnapshot, VerificationType};
use crate::jvm::FieldType;
use std::error;
use std::fmt;

/// Errors in how the advice itself is put together
///
/// These are raised while building a descriptor, before any target method is
/// in sight.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// More than one body claimed the enter phase
    DuplicateEnterAdvice,
    /// More than one body claimed the exit phase
    DuplicateExitAdvice,
    /// Advice bodies must be statically invocable
    NonStaticAdvice { unit: String },
    /// A descriptor needs at least one body
    NoAdviceBody,
    /// Skip is an enter-phase directive
    SkipOnExitAdvice,
    /// Repeat and the exceptional-exit filter are exit-phase directives
    RepeatOnEnterAdvice,
    ExceptionFilterOnEnterAdvice,
    /// A binding was declared for every parameter, or not at all
    ParameterCountMismatch { declared: usize, parameters: usize },
    /// Skipping on the advised value requires the body to produce one
    SkipRequiresValue,
    /// Repeating on the advised value requires the body to produce one
    RepeatRequiresValue,
    /// Descriptor names are registry keys
    DuplicateAdviceName(String),
}

/// Errors resolving a binding declaration against a concrete target method
#[derive(Debug, PartialEq)]
pub enum BindError {
    /// Argument index past the end of the target's parameter list
    ArgumentOutOfRange { index: u16, arguments: usize },
    /// No coercion exists between the bound value and the declared parameter
    NotAssignable {
        parameter: usize,
        from: FieldType,
        to: FieldType,
    },
    /// The receiver does not exist yet when enter advice runs in a constructor
    ReceiverOnConstructorEnter { parameter: usize },
    /// Static targets have no receiver
    ReceiverOnStaticMethod { parameter: usize },
    /// Return and thrown values only exist during the exit phase
    ExitOnlyBinding { parameter: usize },
    /// The delegating strategy calls the body out of line, so writes to
    /// bound state would be lost
    WritableBindingInDelegation { parameter: usize },
    /// Writing through a binding that does not support it
    ReadOnlyBinding { parameter: usize },
    /// Two registered binders both claimed the marker
    AmbiguousCustomBinding { parameter: usize, marker: String },
    /// No registered binder claimed the marker
    UnresolvedCustomBinding { parameter: usize, marker: String },
    /// Field binding named a field the hierarchy does not know
    UnknownField { field: String },
    /// Skipping jumps over the body, which requires somewhere to land
    SkipOnNeverReturning,
    /// A predicate asked for an element of a non-array advised value
    PredicateNotIndexable { found: FieldType },
    /// A boolean predicate over a non-boolean advised value
    PredicateTypeMismatch { found: FieldType },
}

/// Errors in the structure of an instruction stream or its frames
#[derive(Debug, PartialEq)]
pub enum StructuralError {
    /// A recorded frame stops before the implicit receiver/argument prefix
    FrameTooShort {
        at: Option<InsnIdx>,
        expected: usize,
        found: usize,
    },
    /// A recorded frame silently dropped an implicit slot
    ImplicitStateOmitted { at: Option<InsnIdx>, slot: u16 },
    /// A recorded frame disagrees with the declared shape about a slot
    InconsistentFrame {
        at: Option<InsnIdx>,
        slot: u16,
        expected: VerificationType,
        found: VerificationType,
    },
    /// A carried-over frame disagrees with the recomputed one at its index
    ConflictingFrames {
        at: InsnIdx,
        expected: Box<FrameSnapshot>,
        found: Box<FrameSnapshot>,
    },
    BranchTargetOutOfRange {
        at: InsnIdx,
        target: InsnIdx,
        len: usize,
    },
    StackUnderflow { at: InsnIdx },
    /// A load or store addressed a slot past the frame
    SlotOutOfRange { at: InsnIdx, slot: u16 },
    /// The value on the stack has the wrong category for the instruction
    InvalidType {
        at: InsnIdx,
        found: VerificationType,
    },
    UnboundLabel(usize),
    DuplicateLabel(usize),
    /// Control reaches the end of the stream without a terminal instruction
    FallsOffEnd(InsnIdx),
}

/// Any failure while weaving advice into a method
#[derive(Debug, PartialEq)]
pub enum WeaveError {
    Config(ConfigError),
    Bind(BindError),
    Structural(StructuralError),
}

impl From<ConfigError> for WeaveError {
    fn from(err: ConfigError) -> WeaveError {
        WeaveError::Config(err)
    }
}

impl From<BindError> for WeaveError {
    fn from(err: BindError) -> WeaveError {
        WeaveError::Bind(err)
    }
}

impl From<StructuralError> for WeaveError {
    fn from(err: StructuralError) -> WeaveError {
        WeaveError::Structural(err)
    }
}

impl fmt::Display for WeaveError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeaveError::Config(err) => write!(formatter, "advice configuration error: {:?}", err),
            WeaveError::Bind(err) => write!(formatter, "binding resolution error: {:?}", err),
            WeaveError::Structural(err) => write!(formatter, "structural error: {:?}", err),
        }
    }
}

impl error::Error for WeaveError {}
