use crate::jvm::frame::FrameSnapshot;
use crate::jvm::{BaseType, ClassName, ConstValue, FieldType, LocalKind};
use crate::weave::errors::StructuralError;
use std::collections::BTreeMap;
use std::fmt;

/// Absolute index of an instruction in an [`InsnStream`]
///
/// Branch targets are plain indices into the instruction arena; relocating a
/// region of code is index arithmetic, nothing more.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InsnIdx(pub usize);

impl fmt::Debug for InsnIdx {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("@{}", self.0))
    }
}

/// Reference to a field, resolved by the collaborating reflection layer
#[derive(Clone, PartialEq, Debug)]
pub struct FieldRef {
    pub owner: ClassName,
    pub name: String,
    pub ty: FieldType,
}

/// Reference to a separately compiled, statically invocable unit
///
/// The delegating dispatch strategy calls the advice body through one of
/// these instead of splicing its instructions in.
#[derive(Clone, PartialEq, Debug)]
pub struct UnitRef {
    pub name: String,
    pub parameters: Vec<FieldType>,
    pub return_type: Option<FieldType>,
}

/// Predicate evaluated by a conditional branch against the popped value
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ValueTest {
    /// Zero, false, or null
    IsDefault,
    IsNonDefault,
}

/// Symbolic instruction record
///
/// This is a category-typed slice of the JVM instruction set: enough to
/// express method bodies, advice bodies, and everything the weaver itself
/// emits, without committing to a binary encoding (the reader/writer owns
/// that). Loads and stores name their slot directly, so the inlining
/// dispatcher relocates storage references by rewriting the slot field.
#[derive(Clone, PartialEq, Debug)]
pub enum Insn {
    Nop,
    Const(ConstValue),
    Load(LocalKind, u16),
    Store(LocalKind, u16),
    Pop,
    /// Duplicate the top stack value (single-width values only)
    Dup,
    /// Pop two numeric values of the given category, push their sum
    Add(LocalKind),
    /// Pop two ints, push 1 if the lower-popped is strictly less than the upper
    IntLt,
    /// Widening primitive conversion
    Widen { from: BaseType, to: BaseType },
    BoxPrim(BaseType),
    UnboxPrim(BaseType),
    /// Checked reference cast; the type must be a reference type
    CheckCast(FieldType),
    /// Pop a length, push a new array with the given element type
    NewArray(FieldType),
    /// Pop index and array, push the element
    ArrayLoad(LocalKind),
    /// Pop value, index, and array
    ArrayStore(LocalKind),
    GetField(FieldRef),
    PutField(FieldRef),
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    /// Push a fresh, initialized instance of the named class
    New(ClassName),
    /// Pop arguments right-to-left, call the unit, push its return value
    Invoke(UnitRef),
    Goto(InsnIdx),
    Branch {
        test: ValueTest,
        kind: LocalKind,
        target: InsnIdx,
    },
    Return(Option<LocalKind>),
    /// Pop a throwable reference and raise it
    Throw,
}

impl Insn {
    /// Branch target, if this instruction has one
    pub fn jump_target(&self) -> Option<InsnIdx> {
        match self {
            Insn::Goto(target) | Insn::Branch { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// Does control never fall through to the next instruction?
    pub fn is_terminal(&self) -> bool {
        matches!(self, Insn::Goto(_) | Insn::Return(_) | Insn::Throw)
    }
}

/// Exception handler region; `end` is exclusive
#[derive(Clone, PartialEq, Debug)]
pub struct HandlerEntry {
    pub start: InsnIdx,
    pub end: InsnIdx,
    pub handler: InsnIdx,
    /// `None` catches any throwable
    pub catch_type: Option<ClassName>,
}

/// A method or advice body: an instruction arena plus its exception table
/// and the verification frames recorded at branch targets
#[derive(Clone, PartialEq, Debug, Default)]
pub struct InsnStream {
    pub insns: Vec<Insn>,
    pub handlers: Vec<HandlerEntry>,
    pub frames: BTreeMap<InsnIdx, FrameSnapshot>,
}

impl InsnStream {
    pub fn new(insns: Vec<Insn>) -> InsnStream {
        InsnStream {
            insns,
            handlers: vec![],
            frames: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// Does any instruction return normally?
    pub fn has_return(&self) -> bool {
        self.insns.iter().any(|insn| matches!(insn, Insn::Return(_)))
    }

    /// Highest slot touched by a load or store, plus that access's width
    ///
    /// This is how the frame size of a body without declared metadata (an
    /// advice body's scratch locals, say) gets measured.
    pub fn local_span(&self) -> u16 {
        let mut span = 0u16;
        for insn in &self.insns {
            if let Insn::Load(kind, slot) | Insn::Store(kind, slot) = insn {
                span = span.max(slot + if kind.is_wide() { 2 } else { 1 });
            }
        }
        span
    }
}

/// Forward reference to an instruction index that has not been emitted yet
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Label(usize);

/// Builder for an [`InsnStream`]
///
/// Forward branches go through [`Label`]s which are patched to absolute
/// indices when the stream is finished; everything else is appended in
/// order. Splicing an existing stream in relocates its slots and branch
/// targets as it copies.
pub struct Emitter {
    insns: Vec<Insn>,
    bound: Vec<Option<InsnIdx>>,
    patches: Vec<(usize, Label)>,
    handlers: Vec<HandlerEntry>,
    pending_handlers: Vec<(Label, Label, Label, Option<ClassName>)>,
    expected_frames: BTreeMap<InsnIdx, FrameSnapshot>,
}

impl Emitter {
    pub fn new() -> Emitter {
        Emitter {
            insns: vec![],
            bound: vec![],
            patches: vec![],
            handlers: vec![],
            pending_handlers: vec![],
            expected_frames: BTreeMap::new(),
        }
    }

    pub fn fresh_label(&mut self) -> Label {
        self.bound.push(None);
        Label(self.bound.len() - 1)
    }

    /// Index the next pushed instruction will occupy
    pub fn next_idx(&self) -> InsnIdx {
        InsnIdx(self.insns.len())
    }

    /// Fix a label to the current position
    pub fn bind(&mut self, label: Label) -> Result<(), StructuralError> {
        match &mut self.bound[label.0] {
            Some(_) => Err(StructuralError::DuplicateLabel(label.0)),
            slot => {
                *slot = Some(InsnIdx(self.insns.len()));
                Ok(())
            }
        }
    }

    pub fn push(&mut self, insn: Insn) {
        self.insns.push(insn);
    }

    pub fn goto(&mut self, label: Label) {
        self.patches.push((self.insns.len(), label));
        self.insns.push(Insn::Goto(InsnIdx(usize::MAX)));
    }

    pub fn branch(&mut self, test: ValueTest, kind: LocalKind, label: Label) {
        self.patches.push((self.insns.len(), label));
        self.insns.push(Insn::Branch {
            test,
            kind,
            target: InsnIdx(usize::MAX),
        });
    }

    /// Register an exception handler over a labelled region
    pub fn add_handler(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<ClassName>,
    ) {
        self.pending_handlers.push((start, end, handler, catch_type));
    }

    /// Copy a whole stream into the output, relocating as it goes
    ///
    ///   - every slot reference is shifted by `slot_shift`
    ///   - every branch target is shifted to its new absolute position
    ///   - every return becomes a jump to `return_to`, when one is given
    ///   - exception handler regions move along with the instructions
    ///
    /// When `carry_frames` is set, the source stream's recorded verification
    /// frames are kept (at their shifted positions) for the recomputation
    /// pass to cross-check. That is only sound when `slot_shift` is zero,
    /// since frames describe slots by absolute index.
    pub fn splice(
        &mut self,
        stream: &InsnStream,
        slot_shift: u16,
        return_to: Option<Label>,
        carry_frames: bool,
    ) -> Result<(), StructuralError> {
        let base = self.insns.len();
        let len = stream.insns.len();

        let shifted = |at: usize, target: InsnIdx| -> Result<InsnIdx, StructuralError> {
            if target.0 >= len {
                return Err(StructuralError::BranchTargetOutOfRange {
                    at: InsnIdx(base + at),
                    target,
                    len,
                });
            }
            Ok(InsnIdx(base + target.0))
        };

        for (at, insn) in stream.insns.iter().enumerate() {
            let relocated = match insn {
                Insn::Load(kind, slot) => Insn::Load(*kind, slot + slot_shift),
                Insn::Store(kind, slot) => Insn::Store(*kind, slot + slot_shift),
                Insn::Goto(target) => Insn::Goto(shifted(at, *target)?),
                Insn::Branch { test, kind, target } => Insn::Branch {
                    test: *test,
                    kind: *kind,
                    target: shifted(at, *target)?,
                },
                Insn::Return(_) => match return_to {
                    Some(label) => {
                        self.goto(label);
                        continue;
                    }
                    None => insn.clone(),
                },
                other => other.clone(),
            };
            self.insns.push(relocated);
        }

        for handler in &stream.handlers {
            self.handlers.push(HandlerEntry {
                start: shifted(handler.start.0, handler.start)?,
                end: InsnIdx(base + handler.end.0.min(len)),
                handler: shifted(handler.handler.0, handler.handler)?,
                catch_type: handler.catch_type.clone(),
            });
        }

        if carry_frames {
            debug_assert_eq!(slot_shift, 0);
            for (idx, frame) in &stream.frames {
                self.expected_frames
                    .insert(InsnIdx(base + idx.0), frame.clone());
            }
        }

        Ok(())
    }

    /// Patch all labels and produce the finished stream, together with the
    /// verification frames carried over from spliced inputs
    pub fn finish(
        mut self,
    ) -> Result<(InsnStream, BTreeMap<InsnIdx, FrameSnapshot>), StructuralError> {
        for (at, label) in self.patches {
            let target = self.bound[label.0].ok_or(StructuralError::UnboundLabel(label.0))?;
            match &mut self.insns[at] {
                Insn::Goto(slot) | Insn::Branch { target: slot, .. } => *slot = target,
                _ => unreachable!("patch recorded for a non-branching instruction"),
            }
        }

        for (start, end, handler, catch_type) in self.pending_handlers {
            let start = self.bound[start.0].ok_or(StructuralError::UnboundLabel(start.0))?;
            let end = self.bound[end.0].ok_or(StructuralError::UnboundLabel(end.0))?;
            let handler = self.bound[handler.0].ok_or(StructuralError::UnboundLabel(handler.0))?;
            if start < end {
                self.handlers.push(HandlerEntry {
                    start,
                    end,
                    handler,
                    catch_type,
                });
            }
        }

        let stream = InsnStream {
            insns: self.insns,
            handlers: self.handlers,
            frames: BTreeMap::new(),
        };
        Ok((stream, self.expected_frames))
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}
