use crate::jvm::{FieldType, LocalKind, MethodShape};
use crate::util::{packed_slot, total_width, Width};
use crate::weave::errors::StructuralError;
use crate::weave::DispatchStrategy;

/// Block of appended slots holding an inlined advice body's frame
///
/// The body's own slot numbering starts at zero; splicing shifts every load
/// and store by `base`, so its parameters and scratch locals land here
/// without touching original slots.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AdviceRegion {
    pub base: u16,
    /// Parameter types, packed from the base by category width
    pub params: Vec<FieldType>,
    /// Full frame width of the body (parameters plus scratch)
    pub width: u16,
}

impl AdviceRegion {
    /// Absolute slot of the region's parameter with the given index
    pub fn param_slot(&self, index: usize) -> Option<u16> {
        packed_slot(&self.params, index).map(|slot| self.base + slot as u16)
    }
}

/// Frame demands of one advice body
pub struct PhaseFootprint<'a> {
    pub params: &'a [FieldType],
    /// Highest slot the body's stream touches (its `local_span`)
    pub scratch: u16,
}

/// Where every piece of woven state lives in the rewritten frame
///
/// Original slots are never renumbered; everything the weaver adds is
/// appended above the target's declared `max_locals`, in a fixed order, so
/// resolving the same advice against the same shape twice yields the same
/// layout.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FrameLayout {
    pub strategy: DispatchStrategy,
    pub original_locals: u16,
    /// Throwable on the exceptional path, or null; present with an exit phase
    pub thrown: Option<u16>,
    /// The value the woven method will return
    pub return_holder: Option<(u16, FieldType)>,
    /// The value the enter body produced
    pub enter_holder: Option<(u16, FieldType)>,
    /// The value the exit body produced; the repeat predicate tests it
    pub exit_holder: Option<(u16, FieldType)>,
    /// (argument slot, backup slot, category) per target argument
    pub backups: Vec<(u16, u16, LocalKind)>,
    pub enter_region: Option<AdviceRegion>,
    pub exit_region: Option<AdviceRegion>,
    pub total_locals: u16,
}

/// What the dispatcher needs appended to the frame
pub struct LayoutRequest<'a> {
    pub strategy: DispatchStrategy,
    pub enter: Option<PhaseFootprint<'a>>,
    pub exit: Option<PhaseFootprint<'a>>,
    pub enter_value: Option<&'a FieldType>,
    pub exit_value: Option<&'a FieldType>,
    /// Returns get rewritten to store through a holder (exit phase or skip)
    pub needs_return_holder: bool,
    pub backup_arguments: bool,
}

impl FrameLayout {
    pub fn compute(
        shape: &MethodShape,
        request: LayoutRequest<'_>,
    ) -> Result<FrameLayout, StructuralError> {
        let implicit = shape.implicit_width();
        if shape.max_locals < implicit {
            return Err(StructuralError::FrameTooShort {
                at: None,
                expected: implicit as usize,
                found: shape.max_locals as usize,
            });
        }

        let mut next = shape.max_locals;
        let mut alloc = |width: u16| {
            let slot = next;
            next += width;
            slot
        };

        let thrown = request.exit.as_ref().map(|_| alloc(1));

        let return_holder = match (&shape.return_type, request.needs_return_holder) {
            (Some(ty), true) => Some((alloc(ty.width() as u16), ty.clone())),
            _ => None,
        };

        let enter_holder = request
            .enter_value
            .map(|ty| (alloc(ty.width() as u16), ty.clone()));

        let exit_holder = request
            .exit_value
            .map(|ty| (alloc(ty.width() as u16), ty.clone()));

        let mut backups = vec![];
        if request.backup_arguments {
            for (index, argument) in shape.parameters.iter().enumerate() {
                let slot = match shape.argument_slot(index as u16) {
                    Some(slot) => slot,
                    None => continue,
                };
                backups.push((
                    slot,
                    alloc(argument.width() as u16),
                    argument.local_kind(),
                ));
            }
        }

        let mut region = |footprint: Option<PhaseFootprint<'_>>| {
            footprint
                .filter(|_| request.strategy == DispatchStrategy::Inlining)
                .map(|footprint| {
                    let params_width = total_width(footprint.params) as u16;
                    let width = params_width.max(footprint.scratch);
                    AdviceRegion {
                        base: alloc(width),
                        params: footprint.params.to_vec(),
                        width,
                    }
                })
        };
        let enter_region = region(request.enter);
        let exit_region = region(request.exit);

        Ok(FrameLayout {
            strategy: request.strategy,
            original_locals: shape.max_locals,
            thrown,
            return_holder,
            enter_holder,
            exit_holder,
            backups,
            enter_region,
            exit_region,
            total_locals: next,
        })
    }
}
