use crate::jvm::hierarchy::ClassHierarchy;
use crate::jvm::{BaseType, ClassName, FieldType, LocalKind, MethodShape};
use crate::util::Width;

/// Verification type of a frame slot or stack entry
///
/// These follow the JVM verifier's type hierarchy. `Top` doubles as the
/// second half of a two-slot value and as a dead/unknown slot; it never
/// appears on the stack.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Long,
    Double,
    Null,
    /// Receiver of a constructor before initialization completes
    UninitializedThis,
    Object(ClassName),
    /// Array with the given element type
    Array(FieldType),
}

impl VerificationType {
    pub fn of(ty: &FieldType) -> VerificationType {
        match ty {
            FieldType::Base(base) => match base.local_kind() {
                LocalKind::Int => VerificationType::Integer,
                LocalKind::Float => VerificationType::Float,
                LocalKind::Long => VerificationType::Long,
                LocalKind::Double => VerificationType::Double,
                LocalKind::Reference => unreachable!("primitives have primitive kinds"),
            },
            FieldType::Object(class) => VerificationType::Object(class.clone()),
            FieldType::Array(element) => VerificationType::Array((**element).clone()),
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            VerificationType::Null
                | VerificationType::UninitializedThis
                | VerificationType::Object(_)
                | VerificationType::Array(_)
        )
    }

    /// Does a value of this type live in a slot of the given category?
    pub fn matches_kind(&self, kind: LocalKind) -> bool {
        match self {
            VerificationType::Integer => kind == LocalKind::Int,
            VerificationType::Float => kind == LocalKind::Float,
            VerificationType::Long => kind == LocalKind::Long,
            VerificationType::Double => kind == LocalKind::Double,
            VerificationType::Top => false,
            other => other.is_reference() && kind == LocalKind::Reference,
        }
    }

    /// Check if one verification type is assignable to another
    pub fn is_assignable<'g>(
        sub: &VerificationType,
        sup: &VerificationType,
        hierarchy: &'g ClassHierarchy<'g>,
    ) -> bool {
        use VerificationType::*;
        match (sub, sup) {
            (_, Top) => true,
            (Integer, Integer) | (Float, Float) | (Long, Long) | (Double, Double) => true,
            (Null, other) => other.is_reference(),
            (UninitializedThis, UninitializedThis) => true,
            (Object(c1), Object(c2)) => hierarchy.is_class_assignable(c1, c2),
            (Array(_), Object(c)) => *c == ClassName::OBJECT,
            (Array(e1), Array(e2)) => hierarchy.is_assignable(
                &FieldType::array(e1.clone()),
                &FieldType::array(e2.clone()),
            ),
            _ => false,
        }
    }

    /// Least common supertype usable in a frame
    ///
    /// Used for exception-handler entry frames, where the recorded locals
    /// must hold at every covered instruction. Irreconcilable slots fall to
    /// `Top`.
    pub fn meet<'g>(
        a: &VerificationType,
        b: &VerificationType,
        hierarchy: &'g ClassHierarchy<'g>,
    ) -> VerificationType {
        use VerificationType::*;
        if a == b {
            return a.clone();
        }
        match (a, b) {
            (Null, other) | (other, Null) if other.is_reference() => other.clone(),
            (Object(c1), Object(c2)) => {
                if hierarchy.is_class_assignable(c1, c2) {
                    Object(c2.clone())
                } else if hierarchy.is_class_assignable(c2, c1) {
                    Object(c1.clone())
                } else {
                    Object(ClassName::OBJECT)
                }
            }
            (Array(_) | Object(_), Array(_) | Object(_)) => Object(ClassName::OBJECT),
            _ => Top,
        }
    }
}

impl Width for VerificationType {
    fn width(&self) -> usize {
        match self {
            VerificationType::Long | VerificationType::Double => 2,
            _ => 1,
        }
    }
}

impl From<BaseType> for VerificationType {
    fn from(base: BaseType) -> VerificationType {
        VerificationType::of(&FieldType::Base(base))
    }
}

/// Snapshot of the locals and stack at one point in a stream
///
/// Locals are indexed per slot: a two-slot value occupies its index plus a
/// trailing `Top`. Stack entries are one per value, whatever the width, with
/// [`FrameSnapshot::stack_width`] accounting for the difference.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct FrameSnapshot {
    pub locals: Vec<VerificationType>,
    pub stack: Vec<VerificationType>,
}

impl FrameSnapshot {
    /// Frame with every slot dead and nothing on the stack
    pub fn empty(total_locals: u16) -> FrameSnapshot {
        FrameSnapshot {
            locals: vec![VerificationType::Top; total_locals as usize],
            stack: vec![],
        }
    }

    /// Frame at the first instruction of a method with the given shape
    pub fn entry(shape: &MethodShape, total_locals: u16) -> FrameSnapshot {
        let mut frame = FrameSnapshot::empty(total_locals);
        let mut slot = 0u16;
        if !shape.is_static() {
            let receiver = if shape.is_constructor() {
                VerificationType::UninitializedThis
            } else {
                VerificationType::Object(shape.class.clone())
            };
            frame.set_local(slot, receiver);
            slot += 1;
        }
        for parameter in &shape.parameters {
            let ty = VerificationType::of(parameter);
            let width = ty.width() as u16;
            frame.set_local(slot, ty);
            slot += width;
        }
        frame
    }

    /// Store a type into a slot, fixing up the halves of any wide neighbours
    ///
    /// Returns false when the slot (plus the value's width) does not fit.
    pub fn set_local(&mut self, slot: u16, ty: VerificationType) -> bool {
        let slot = slot as usize;
        let width = ty.width();
        if slot + width > self.locals.len() {
            return false;
        }
        // A wide value just below loses its second half
        if slot > 0 && self.locals[slot - 1].width() == 2 {
            self.locals[slot - 1] = VerificationType::Top;
        }
        // A wide value starting here loses itself when only its half is hit
        if self.locals[slot].width() == 2 && width == 1 {
            if slot + 1 < self.locals.len() {
                self.locals[slot + 1] = VerificationType::Top;
            }
        }
        self.locals[slot] = ty;
        if width == 2 {
            self.locals[slot + 1] = VerificationType::Top;
        }
        true
    }

    /// Read a slot, checking that it holds a value of the given category
    pub fn get_local(&self, slot: u16, kind: LocalKind) -> Option<&VerificationType> {
        let ty = self.locals.get(slot as usize)?;
        if ty.matches_kind(kind) {
            Some(ty)
        } else {
            None
        }
    }

    pub fn push(&mut self, ty: VerificationType) {
        debug_assert!(ty != VerificationType::Top);
        self.stack.push(ty);
    }

    pub fn pop(&mut self) -> Option<VerificationType> {
        self.stack.pop()
    }

    /// Width of the stack in slots
    pub fn stack_width(&self) -> usize {
        self.stack.iter().map(|ty| ty.width()).sum()
    }

    /// Fold another frame's locals into this one, slot by slot
    pub fn meet_locals<'g>(&mut self, other: &FrameSnapshot, hierarchy: &'g ClassHierarchy<'g>) {
        debug_assert_eq!(self.locals.len(), other.locals.len());
        for (mine, theirs) in self.locals.iter_mut().zip(other.locals.iter()) {
            *mine = VerificationType::meet(mine, theirs, hierarchy);
        }
    }

    /// Merge an incoming frame into this recorded one at a control-flow join
    ///
    /// Locals may generalize (falling towards `Top`); stack entries must stay
    /// concrete, so only reference weakening is tolerated there. Returns
    /// whether this frame changed, or `Err(())` when the frames cannot
    /// describe the same join point.
    pub fn join<'g>(
        &mut self,
        incoming: &FrameSnapshot,
        hierarchy: &'g ClassHierarchy<'g>,
    ) -> Result<bool, ()> {
        if self.stack.len() != incoming.stack.len() || self.locals.len() != incoming.locals.len() {
            return Err(());
        }
        let mut changed = false;
        for (mine, theirs) in self.stack.iter_mut().zip(incoming.stack.iter()) {
            if mine == theirs {
                continue;
            }
            let met = VerificationType::meet(mine, theirs, hierarchy);
            if met == VerificationType::Top {
                return Err(());
            }
            if *mine != met {
                *mine = met;
                changed = true;
            }
        }
        for (mine, theirs) in self.locals.iter_mut().zip(incoming.locals.iter()) {
            if mine == theirs {
                continue;
            }
            let met = VerificationType::meet(mine, theirs, hierarchy);
            if *mine != met {
                *mine = met;
                changed = true;
            }
        }
        Ok(changed)
    }
}
