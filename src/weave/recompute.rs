use crate::jvm::code::{Insn, InsnIdx, InsnStream};
use crate::jvm::frame::{FrameSnapshot, VerificationType};
use crate::jvm::{ClassHierarchy, ClassName, LocalKind, MethodShape};
use crate::weave::errors::StructuralError;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Result of abstractly interpreting a woven stream
pub struct RecomputedFrames {
    /// A frame for every branch target and handler entry
    pub frames: BTreeMap<InsnIdx, FrameSnapshot>,
    pub max_stack: u16,
    pub max_locals: u16,
}

/// Check the target's recorded frames against its declared shape
///
/// The receiver and argument slots are implicit state: a frame that stops
/// short of them, silently drops one, or records a contradictory type for
/// one is rejected before any emission happens.
pub fn validate_input_frames(
    shape: &MethodShape,
    stream: &InsnStream,
) -> Result<(), StructuralError> {
    let implicit = shape.implicit_width();
    let entry = FrameSnapshot::entry(shape, implicit);
    for (at, frame) in &stream.frames {
        if frame.locals.len() < implicit as usize {
            return Err(StructuralError::FrameTooShort {
                at: Some(*at),
                expected: implicit as usize,
                found: frame.locals.len(),
            });
        }
        for slot in 0..implicit as usize {
            let expected = &entry.locals[slot];
            let found = &frame.locals[slot];
            if *expected == VerificationType::Top {
                continue;
            }
            if *found == VerificationType::Top {
                return Err(StructuralError::ImplicitStateOmitted {
                    at: Some(*at),
                    slot: slot as u16,
                });
            }
            let consistent = found == expected
                || (found == &VerificationType::Null && expected.is_reference())
                // The receiver of a constructor is initialized partway through
                || (*expected == VerificationType::UninitializedThis
                    && *found == VerificationType::Object(shape.class.clone()));
            if !consistent {
                return Err(StructuralError::InconsistentFrame {
                    at: Some(*at),
                    slot: slot as u16,
                    expected: expected.clone(),
                    found: found.clone(),
                });
            }
        }
    }
    Ok(())
}

fn kind_type(kind: LocalKind) -> VerificationType {
    match kind {
        LocalKind::Int => VerificationType::Integer,
        LocalKind::Float => VerificationType::Float,
        LocalKind::Long => VerificationType::Long,
        LocalKind::Double => VerificationType::Double,
        LocalKind::Reference => VerificationType::Object(ClassName::OBJECT),
    }
}

fn pop(frame: &mut FrameSnapshot, at: InsnIdx) -> Result<VerificationType, StructuralError> {
    frame.pop().ok_or(StructuralError::StackUnderflow { at })
}

fn pop_kind(
    frame: &mut FrameSnapshot,
    at: InsnIdx,
    kind: LocalKind,
) -> Result<VerificationType, StructuralError> {
    let ty = pop(frame, at)?;
    if ty.matches_kind(kind) {
        Ok(ty)
    } else {
        Err(StructuralError::InvalidType { at, found: ty })
    }
}

/// Apply one instruction's stack and locals effect
fn step(
    frame: &mut FrameSnapshot,
    insn: &Insn,
    at: InsnIdx,
) -> Result<(), StructuralError> {
    match insn {
        Insn::Nop | Insn::Goto(_) | Insn::Return(None) => {}
        Insn::Const(value) => frame.push(match value.local_kind() {
            LocalKind::Reference => VerificationType::Null,
            kind => kind_type(kind),
        }),
        Insn::Load(kind, slot) => {
            if *slot as usize >= frame.locals.len() {
                return Err(StructuralError::SlotOutOfRange { at, slot: *slot });
            }
            let ty = frame.locals[*slot as usize].clone();
            if !ty.matches_kind(*kind) {
                return Err(StructuralError::InvalidType { at, found: ty });
            }
            frame.push(ty);
        }
        Insn::Store(kind, slot) => {
            let ty = pop_kind(frame, at, *kind)?;
            if !frame.set_local(*slot, ty) {
                return Err(StructuralError::SlotOutOfRange { at, slot: *slot });
            }
        }
        Insn::Pop => {
            pop(frame, at)?;
        }
        Insn::Dup => {
            let ty = pop(frame, at)?;
            if ty.matches_kind(LocalKind::Long) || ty.matches_kind(LocalKind::Double) {
                return Err(StructuralError::InvalidType { at, found: ty });
            }
            frame.push(ty.clone());
            frame.push(ty);
        }
        Insn::Add(kind) => {
            pop_kind(frame, at, *kind)?;
            pop_kind(frame, at, *kind)?;
            frame.push(kind_type(*kind));
        }
        Insn::IntLt => {
            pop_kind(frame, at, LocalKind::Int)?;
            pop_kind(frame, at, LocalKind::Int)?;
            frame.push(VerificationType::Integer);
        }
        Insn::Widen { from, to } => {
            pop_kind(frame, at, from.local_kind())?;
            frame.push(kind_type(to.local_kind()));
        }
        Insn::BoxPrim(base) => {
            pop_kind(frame, at, base.local_kind())?;
            frame.push(VerificationType::Object(base.boxed()));
        }
        Insn::UnboxPrim(base) => {
            pop_kind(frame, at, LocalKind::Reference)?;
            frame.push(kind_type(base.local_kind()));
        }
        Insn::CheckCast(ty) => {
            pop_kind(frame, at, LocalKind::Reference)?;
            frame.push(VerificationType::of(ty));
        }
        Insn::NewArray(element) => {
            pop_kind(frame, at, LocalKind::Int)?;
            frame.push(VerificationType::Array(element.clone()));
        }
        Insn::ArrayLoad(kind) => {
            pop_kind(frame, at, LocalKind::Int)?;
            let array = pop_kind(frame, at, LocalKind::Reference)?;
            let element = match &array {
                VerificationType::Array(element) if element.local_kind() == *kind => {
                    VerificationType::of(element)
                }
                VerificationType::Array(_) => {
                    return Err(StructuralError::InvalidType { at, found: array })
                }
                _ => kind_type(*kind),
            };
            frame.push(element);
        }
        Insn::ArrayStore(kind) => {
            pop_kind(frame, at, *kind)?;
            pop_kind(frame, at, LocalKind::Int)?;
            pop_kind(frame, at, LocalKind::Reference)?;
        }
        Insn::GetField(field) => {
            pop_kind(frame, at, LocalKind::Reference)?;
            frame.push(VerificationType::of(&field.ty));
        }
        Insn::PutField(field) => {
            pop_kind(frame, at, field.ty.local_kind())?;
            pop_kind(frame, at, LocalKind::Reference)?;
        }
        Insn::GetStatic(field) => frame.push(VerificationType::of(&field.ty)),
        Insn::PutStatic(field) => {
            pop_kind(frame, at, field.ty.local_kind())?;
        }
        Insn::New(class) => frame.push(VerificationType::Object(class.clone())),
        Insn::Invoke(unit) => {
            for parameter in unit.parameters.iter().rev() {
                pop_kind(frame, at, parameter.local_kind())?;
            }
            if let Some(result) = &unit.return_type {
                frame.push(VerificationType::of(result));
            }
        }
        Insn::Branch { kind, .. } => {
            pop_kind(frame, at, *kind)?;
        }
        Insn::Return(Some(kind)) => {
            pop_kind(frame, at, *kind)?;
        }
        Insn::Throw => {
            pop_kind(frame, at, LocalKind::Reference)?;
        }
    }
    Ok(())
}

fn merge<'g>(
    states: &mut BTreeMap<InsnIdx, FrameSnapshot>,
    work: &mut VecDeque<InsnIdx>,
    at: InsnIdx,
    incoming: FrameSnapshot,
    hierarchy: &'g ClassHierarchy<'g>,
) -> Result<bool, StructuralError> {
    match states.get_mut(&at) {
        None => {
            states.insert(at, incoming);
            work.push_back(at);
            Ok(true)
        }
        Some(existing) => match existing.join(&incoming, hierarchy) {
            Ok(true) => {
                work.push_back(at);
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(()) => Err(StructuralError::ConflictingFrames {
                at,
                expected: Box::new(existing.clone()),
                found: Box::new(incoming),
            }),
        },
    }
}

/// Recompute verification frames for a woven stream by abstract
/// interpretation from the entry frame
///
/// `expected` carries the original body's frames at their new positions;
/// the computed state at each of those indices must be at least as specific,
/// or the weave is rejected rather than silently emitting unverifiable
/// output.
pub fn recompute<'g>(
    shape: &MethodShape,
    total_locals: u16,
    stream: &InsnStream,
    expected: &BTreeMap<InsnIdx, FrameSnapshot>,
    hierarchy: &'g ClassHierarchy<'g>,
) -> Result<RecomputedFrames, StructuralError> {
    let len = stream.insns.len();
    let mut states: BTreeMap<InsnIdx, FrameSnapshot> = BTreeMap::new();
    let mut work: VecDeque<InsnIdx> = VecDeque::new();
    let mut max_stack = 0usize;

    states.insert(InsnIdx(0), FrameSnapshot::entry(shape, total_locals));
    work.push_back(InsnIdx(0));

    loop {
        while let Some(at) = work.pop_front() {
            let mut frame = match states.get(&at) {
                Some(frame) => frame.clone(),
                None => continue,
            };
            let insn = &stream.insns[at.0];
            step(&mut frame, insn, at)?;
            max_stack = max_stack.max(frame.stack_width());

            if !insn.is_terminal() {
                if at.0 + 1 >= len {
                    return Err(StructuralError::FallsOffEnd(at));
                }
                merge(&mut states, &mut work, InsnIdx(at.0 + 1), frame.clone(), hierarchy)?;
            }
            if let Some(target) = insn.jump_target() {
                if target.0 >= len {
                    return Err(StructuralError::BranchTargetOutOfRange {
                        at,
                        target,
                        len,
                    });
                }
                merge(&mut states, &mut work, target, frame.clone(), hierarchy)?;
            }
        }

        // Handler entries depend on every covered state, which in turn may
        // depend on handler entries; iterate to a fixpoint
        let mut changed = false;
        for handler in &stream.handlers {
            let mut entry: Option<FrameSnapshot> = None;
            for covered in handler.start.0..handler.end.0 {
                if let Some(state) = states.get(&InsnIdx(covered)) {
                    match &mut entry {
                        None => {
                            let mut first = state.clone();
                            first.stack.clear();
                            entry = Some(first);
                        }
                        Some(entry) => entry.meet_locals(state, hierarchy),
                    }
                }
            }
            if let Some(mut entry) = entry {
                let catch = handler
                    .catch_type
                    .clone()
                    .unwrap_or(ClassName::THROWABLE);
                entry.stack = vec![VerificationType::Object(catch)];
                max_stack = max_stack.max(entry.stack_width());
                changed |= merge(&mut states, &mut work, handler.handler, entry, hierarchy)?;
            }
        }
        if !changed && work.is_empty() {
            break;
        }
    }

    for (at, want) in expected {
        if let Some(got) = states.get(at) {
            check_carried_frame(*at, want, got, hierarchy)?;
        }
    }

    let mut targets: BTreeSet<InsnIdx> = stream
        .insns
        .iter()
        .filter_map(|insn| insn.jump_target())
        .collect();
    targets.extend(stream.handlers.iter().map(|handler| handler.handler));

    let frames = states
        .into_iter()
        .filter(|(at, _)| targets.contains(at))
        .collect();

    log::trace!(
        "recomputed {} frames, max_stack {}, max_locals {}",
        targets.len(),
        max_stack,
        total_locals,
    );

    Ok(RecomputedFrames {
        frames,
        max_stack: max_stack as u16,
        max_locals: total_locals,
    })
}

/// A frame carried over from the original body must still hold: the
/// computed state may be more specific, never contradictory
fn check_carried_frame<'g>(
    at: InsnIdx,
    want: &FrameSnapshot,
    got: &FrameSnapshot,
    hierarchy: &'g ClassHierarchy<'g>,
) -> Result<(), StructuralError> {
    let conflict = || StructuralError::ConflictingFrames {
        at,
        expected: Box::new(want.clone()),
        found: Box::new(got.clone()),
    };
    if got.stack.len() != want.stack.len() {
        return Err(conflict());
    }
    for (got, want) in got.stack.iter().zip(want.stack.iter()) {
        if !VerificationType::is_assignable(got, want, hierarchy) {
            return Err(conflict());
        }
    }
    // Only the slots the original frame describes are constrained; appended
    // weaver state lies beyond them
    for (got, want) in got.locals.iter().zip(want.locals.iter()) {
        if !VerificationType::is_assignable(got, want, hierarchy) {
            return Err(conflict());
        }
    }
    Ok(())
}
