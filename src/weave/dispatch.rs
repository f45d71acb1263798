use crate::jvm::code::{Emitter, Insn, InsnIdx, InsnStream, Label, ValueTest};
use crate::jvm::frame::FrameSnapshot;
use crate::jvm::{ClassHierarchy, ConstValue, FieldType, LocalKind, MethodShape};
use crate::weave::binding::{
    resolve_bindings, CustomBinder, ResolvedBinding, StorageLocation,
};
use crate::weave::control::{resolve_predicate, DispatchDirective};
use crate::weave::descriptor::{AdviceBody, AdviceDescriptor};
use crate::weave::errors::{BindError, WeaveError};
use crate::weave::layout::{AdviceRegion, FrameLayout, LayoutRequest, PhaseFootprint};
use crate::weave::DispatchStrategy;
use std::collections::BTreeMap;

/// One advice phase with its binding table resolved against the target
struct ResolvedPhase<'a> {
    body: &'a AdviceBody,
    bindings: Vec<ResolvedBinding>,
}

/// Deferred out-of-line block: a suppression handler parked after the tail
struct SuppressionBlock {
    handler: Label,
    /// Holder to default when the advice body was cut short
    holder: Option<(u16, FieldType)>,
    resume: Label,
}

/// A descriptor paired with a strategy, ready to resolve against targets
pub struct Dispatcher<'a, 'g> {
    descriptor: &'a AdviceDescriptor,
    strategy: DispatchStrategy,
    hierarchy: &'g ClassHierarchy<'g>,
    customs: &'a [(String, Box<dyn CustomBinder>)],
}

impl<'a, 'g> Dispatcher<'a, 'g> {
    pub fn new(
        descriptor: &'a AdviceDescriptor,
        strategy: DispatchStrategy,
        hierarchy: &'g ClassHierarchy<'g>,
        customs: &'a [(String, Box<dyn CustomBinder>)],
    ) -> Self {
        Dispatcher {
            descriptor,
            strategy,
            hierarchy,
            customs,
        }
    }

    /// Resolve bindings, directives, and the frame layout for one target
    ///
    /// Nothing is emitted yet; every rejection the weaver can make before
    /// touching instructions happens here.
    pub fn resolve(
        &self,
        shape: &'a MethodShape,
        target: &InsnStream,
    ) -> Result<ResolvedDispatcher<'a>, WeaveError> {
        let enter_value = self.descriptor.enter_value_type();
        let resolve_phase = |body: &'a AdviceBody| -> Result<ResolvedPhase<'a>, WeaveError> {
            let bindings = resolve_bindings(
                shape,
                body.phase,
                self.strategy,
                &body.params,
                enter_value,
                self.hierarchy,
                self.customs,
            )?;
            Ok(ResolvedPhase { body, bindings })
        };
        let enter = self.descriptor.enter().map(resolve_phase).transpose()?;
        let exit = self.descriptor.exit().map(resolve_phase).transpose()?;

        let mut directive = DispatchDirective::default();
        if let Some(phase) = &enter {
            let control = &phase.body.control;
            if let (Some(spec), Some(ty)) = (&control.skip, phase.body.value_type()) {
                if !target.has_return() {
                    return Err(BindError::SkipOnNeverReturning.into());
                }
                directive.skip = Some(resolve_predicate(spec.test, spec.index, ty)?);
            }
            directive.suppress_enter = control.suppress.clone();
        }
        if let Some(phase) = &exit {
            let control = &phase.body.control;
            if let (Some(spec), Some(ty)) = (&control.repeat, phase.body.value_type()) {
                directive.repeat = Some(resolve_predicate(spec.test, None, ty)?);
                directive.backup_arguments = spec.backup_arguments;
            }
            directive.suppress_exit = control.suppress.clone();
            directive.on_throwable = control.on_throwable.clone();
        }

        let footprint = |phase: &Option<ResolvedPhase<'a>>| {
            phase.as_ref().map(|phase| PhaseFootprint {
                params: &phase.body.unit.parameters,
                scratch: phase.body.stream.local_span(),
            })
        };
        let layout = FrameLayout::compute(
            shape,
            LayoutRequest {
                strategy: self.strategy,
                enter: footprint(&enter),
                exit: footprint(&exit),
                enter_value,
                exit_value: exit.as_ref().and_then(|phase| phase.body.value_type()),
                needs_return_holder: exit.is_some() || directive.skip.is_some(),
                backup_arguments: directive.backup_arguments,
            },
        )?;

        log::debug!(
            "resolved advice '{}' against {}.{}: {:?}, {} appended slots",
            self.descriptor.name(),
            shape.class,
            shape.name,
            self.strategy,
            layout.total_locals - layout.original_locals,
        );

        Ok(ResolvedDispatcher {
            shape,
            layout,
            directive,
            enter,
            exit,
        })
    }
}

/// Bindings and frame layout fixed; all that remains is emission
pub struct ResolvedDispatcher<'a> {
    shape: &'a MethodShape,
    pub layout: FrameLayout,
    pub directive: DispatchDirective,
    enter: Option<ResolvedPhase<'a>>,
    exit: Option<ResolvedPhase<'a>>,
}

impl<'a> ResolvedDispatcher<'a> {
    /// Whether returns in the original body get rerouted to a common tail
    fn rewrites_returns(&self) -> bool {
        self.exit.is_some() || self.directive.skip.is_some()
    }

    /// Emit the woven stream
    ///
    /// Also returns the original body's verification frames at their new
    /// positions, for the recomputation pass to cross-check.
    pub fn emit(
        &self,
        target: &InsnStream,
    ) -> Result<(InsnStream, BTreeMap<InsnIdx, FrameSnapshot>), WeaveError> {
        let layout = &self.layout;
        let rewrite = self.rewrites_returns();
        let mut e = Emitter::new();
        let mut suppressions = vec![];

        let iteration = e.fresh_label();
        let exit_entry = e.fresh_label();

        // One-time argument snapshot, before the first iteration
        for (argument, backup, kind) in &layout.backups {
            e.push(Insn::Load(*kind, *argument));
            e.push(Insn::Store(*kind, *backup));
        }

        // Per-iteration state: a repeat must not observe the previous
        // iteration's throwable or return value
        e.bind(iteration)?;
        if let Some(thrown) = layout.thrown {
            e.push(Insn::Const(ConstValue::Null));
            e.push(Insn::Store(LocalKind::Reference, thrown));
        }
        if let Some((slot, ty)) = &layout.return_holder {
            e.push(Insn::Const(ty.default_const()));
            e.push(Insn::Store(ty.local_kind(), *slot));
        }

        if let Some(phase) = &self.enter {
            self.emit_phase(
                &mut e,
                phase,
                layout.enter_region.as_ref(),
                layout.enter_holder.clone(),
                self.directive.suppress_enter.clone(),
                &mut suppressions,
            )?;
        }

        if let Some(pred) = &self.directive.skip {
            if let Some((slot, _)) = &layout.enter_holder {
                match pred.index {
                    Some(index) => {
                        e.push(Insn::Load(LocalKind::Reference, *slot));
                        e.push(Insn::Const(ConstValue::Int(index as i32)));
                        e.push(Insn::ArrayLoad(pred.kind));
                    }
                    None => e.push(Insn::Load(pred.kind, *slot)),
                }
                e.branch(pred.test, pred.kind, exit_entry);
            }
        }

        // The original body, slots untouched, at a fixed base offset
        let body_start = e.fresh_label();
        let body_end = e.fresh_label();
        let return_trampoline = e.fresh_label();
        e.bind(body_start)?;
        e.splice(target, 0, rewrite.then_some(return_trampoline), true)?;
        e.bind(body_end)?;

        let on_throwable_handler = self.directive.on_throwable.as_ref().map(|filter| {
            let handler = e.fresh_label();
            e.add_handler(body_start, body_end, handler, Some(filter.clone()));
            handler
        });

        if rewrite {
            // Every rewritten return lands here with its value on the stack
            e.bind(return_trampoline)?;
            if let Some((slot, ty)) = &layout.return_holder {
                e.push(Insn::Store(ty.local_kind(), *slot));
            }
        }

        e.bind(exit_entry)?;
        if let Some(phase) = &self.exit {
            self.emit_phase(
                &mut e,
                phase,
                layout.exit_region.as_ref(),
                layout.exit_holder.clone(),
                self.directive.suppress_exit.clone(),
                &mut suppressions,
            )?;
        }

        let restore = e.fresh_label();
        if let Some(pred) = &self.directive.repeat {
            if let Some((slot, _)) = &layout.exit_holder {
                e.push(Insn::Load(pred.kind, *slot));
                e.branch(pred.test, pred.kind, restore);
            }
        }

        if rewrite {
            if let Some(thrown) = layout.thrown {
                let normal = e.fresh_label();
                e.push(Insn::Load(LocalKind::Reference, thrown));
                e.branch(ValueTest::IsDefault, LocalKind::Reference, normal);
                e.push(Insn::Load(LocalKind::Reference, thrown));
                e.push(Insn::Throw);
                e.bind(normal)?;
            }
            match &layout.return_holder {
                Some((slot, ty)) => {
                    e.push(Insn::Load(ty.local_kind(), *slot));
                    e.push(Insn::Return(Some(ty.local_kind())));
                }
                None => e.push(Insn::Return(None)),
            }
        }

        // Out-of-line blocks, reached only through branches and handlers

        if self.directive.repeat.is_some() {
            e.bind(restore)?;
            for (argument, backup, kind) in &layout.backups {
                e.push(Insn::Load(*kind, *backup));
                e.push(Insn::Store(*kind, *argument));
            }
            e.goto(iteration);
        }

        if let Some(handler) = on_throwable_handler {
            e.bind(handler)?;
            if let Some(thrown) = layout.thrown {
                e.push(Insn::Store(LocalKind::Reference, thrown));
            } else {
                e.push(Insn::Pop);
            }
            e.goto(exit_entry);
        }

        for block in suppressions {
            e.bind(block.handler)?;
            e.push(Insn::Pop);
            if let Some((slot, ty)) = &block.holder {
                e.push(Insn::Const(ty.default_const()));
                e.push(Insn::Store(ty.local_kind(), *slot));
            }
            e.goto(block.resume);
        }

        let (stream, expected) = e.finish()?;
        Ok((stream, expected))
    }

    /// Emit one advice phase: materialization, the body (spliced or
    /// invoked), the holder store, write-backs, and the suppression guard
    fn emit_phase(
        &self,
        e: &mut Emitter,
        phase: &ResolvedPhase<'a>,
        region: Option<&AdviceRegion>,
        holder: Option<(u16, FieldType)>,
        suppress: Option<crate::jvm::ClassName>,
        suppressions: &mut Vec<SuppressionBlock>,
    ) -> Result<(), WeaveError> {
        let guard_start = e.fresh_label();
        let guard_end = e.fresh_label();
        let done = e.fresh_label();
        let resume = e.fresh_label();

        e.bind(guard_start)?;
        match region {
            // Inlining: bound values land in the advice region's parameter
            // slots, then the body runs in place
            Some(region) => {
                for (index, binding) in phase.bindings.iter().enumerate() {
                    if let Some(slot) = region.param_slot(index) {
                        self.emit_read(e, binding);
                        e.push(Insn::Store(binding.declared.local_kind(), slot));
                    }
                }
                e.splice(&phase.body.stream, region.base, Some(done), false)?;
            }
            // Delegation: bound values go straight onto the call stack
            None => {
                for binding in &phase.bindings {
                    self.emit_read(e, binding);
                }
                e.push(Insn::Invoke(phase.body.unit.clone()));
            }
        }
        e.bind(guard_end)?;
        e.bind(done)?;
        if let Some((slot, ty)) = &holder {
            e.push(Insn::Store(ty.local_kind(), *slot));
        }

        if let Some(region) = region {
            for (index, binding) in phase.bindings.iter().enumerate() {
                if let Some(slot) = region.param_slot(index) {
                    self.emit_write_back(e, binding, slot);
                }
            }
        }
        e.bind(resume)?;

        if let Some(catch_type) = suppress {
            let handler = e.fresh_label();
            e.add_handler(guard_start, guard_end, handler, Some(catch_type));
            suppressions.push(SuppressionBlock {
                handler,
                holder,
                resume,
            });
        }
        Ok(())
    }

    /// Push the bound value, coerced to the parameter's declared type
    fn emit_read(&self, e: &mut Emitter, binding: &ResolvedBinding) {
        let layout = &self.layout;
        match &binding.location {
            StorageLocation::Receiver => e.push(Insn::Load(LocalKind::Reference, 0)),
            StorageLocation::Argument { index } => {
                match (
                    self.shape.argument_slot(*index),
                    self.shape.argument_type(*index),
                ) {
                    (Some(slot), Some(ty)) => e.push(Insn::Load(ty.local_kind(), slot)),
                    _ => e.push(Insn::Const(binding.declared.default_const())),
                }
            }
            StorageLocation::ArgumentVector => {
                self.emit_vector(e, binding);
                return;
            }
            StorageLocation::Return | StorageLocation::Exit => match &layout.return_holder {
                Some((slot, ty)) => e.push(Insn::Load(ty.local_kind(), *slot)),
                None => e.push(Insn::Const(binding.declared.default_const())),
            },
            StorageLocation::Thrown => match layout.thrown {
                Some(slot) => e.push(Insn::Load(LocalKind::Reference, slot)),
                None => e.push(Insn::Const(ConstValue::Null)),
            },
            StorageLocation::Enter => match &layout.enter_holder {
                Some((slot, ty)) => e.push(Insn::Load(ty.local_kind(), *slot)),
                None => e.push(Insn::Const(binding.declared.default_const())),
            },
            StorageLocation::Field { field, is_static } => {
                if *is_static {
                    e.push(Insn::GetStatic(field.clone()));
                } else {
                    e.push(Insn::Load(LocalKind::Reference, 0));
                    e.push(Insn::GetField(field.clone()));
                }
            }
            StorageLocation::Unused => e.push(Insn::Const(binding.declared.default_const())),
        }
        binding.read.emit(e);
    }

    /// Build the argument array, coercing each element as it is stored
    fn emit_vector(&self, e: &mut Emitter, binding: &ResolvedBinding) {
        let plan = match &binding.vector {
            Some(plan) => plan,
            None => return,
        };
        let arguments = &self.shape.parameters;
        e.push(Insn::Const(ConstValue::Int(arguments.len() as i32)));
        e.push(Insn::NewArray(plan.element.clone()));
        for (index, (argument, read)) in arguments.iter().zip(&plan.reads).enumerate() {
            if let Some(slot) = self.shape.argument_slot(index as u16) {
                e.push(Insn::Dup);
                e.push(Insn::Const(ConstValue::Int(index as i32)));
                e.push(Insn::Load(argument.local_kind(), slot));
                read.emit(e);
                e.push(Insn::ArrayStore(plan.element.local_kind()));
            }
        }
    }

    /// Propagate a writable binding's final value back into its storage
    fn emit_write_back(&self, e: &mut Emitter, binding: &ResolvedBinding, param_slot: u16) {
        let layout = &self.layout;
        let declared_kind = binding.declared.local_kind();

        if let Some(plan) = &binding.vector {
            let writes = match &plan.writes {
                Some(writes) => writes,
                None => return,
            };
            for (index, (argument, write)) in
                self.shape.parameters.iter().zip(writes).enumerate()
            {
                if let Some(slot) = self.shape.argument_slot(index as u16) {
                    e.push(Insn::Load(LocalKind::Reference, param_slot));
                    e.push(Insn::Const(ConstValue::Int(index as i32)));
                    e.push(Insn::ArrayLoad(plan.element.local_kind()));
                    write.emit(e);
                    e.push(Insn::Store(argument.local_kind(), slot));
                }
            }
            return;
        }

        let write = match &binding.write {
            Some(write) => write,
            None => return,
        };
        match &binding.location {
            StorageLocation::Argument { index } => {
                match (
                    self.shape.argument_slot(*index),
                    self.shape.argument_type(*index),
                ) {
                    (Some(slot), Some(ty)) => {
                        e.push(Insn::Load(declared_kind, param_slot));
                        write.emit(e);
                        e.push(Insn::Store(ty.local_kind(), slot));
                    }
                    _ => {}
                }
            }
            StorageLocation::Receiver => {
                e.push(Insn::Load(declared_kind, param_slot));
                write.emit(e);
                e.push(Insn::Store(LocalKind::Reference, 0));
            }
            StorageLocation::Return => {
                if let Some((slot, ty)) = &layout.return_holder {
                    e.push(Insn::Load(declared_kind, param_slot));
                    write.emit(e);
                    e.push(Insn::Store(ty.local_kind(), *slot));
                }
            }
            StorageLocation::Thrown => {
                if let Some(slot) = layout.thrown {
                    e.push(Insn::Load(declared_kind, param_slot));
                    write.emit(e);
                    e.push(Insn::Store(LocalKind::Reference, slot));
                }
            }
            StorageLocation::Enter => {
                if let Some((slot, ty)) = &layout.enter_holder {
                    e.push(Insn::Load(declared_kind, param_slot));
                    write.emit(e);
                    e.push(Insn::Store(ty.local_kind(), *slot));
                }
            }
            StorageLocation::Field { field, is_static } => {
                if *is_static {
                    e.push(Insn::Load(declared_kind, param_slot));
                    write.emit(e);
                    e.push(Insn::PutStatic(field.clone()));
                } else {
                    e.push(Insn::Load(LocalKind::Reference, 0));
                    e.push(Insn::Load(declared_kind, param_slot));
                    write.emit(e);
                    e.push(Insn::PutField(field.clone()));
                }
            }
            StorageLocation::ArgumentVector
            | StorageLocation::Exit
            | StorageLocation::Unused => {}
        }
    }
}
