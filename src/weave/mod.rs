//! The weaving core: binding resolution, frame layout, the two dispatch
//! strategies, control-flow directives, and verification-metadata
//! recomputation.

pub mod binding;
pub mod coercion;
pub mod control;
pub mod descriptor;
pub mod dispatch;
pub mod errors;
pub mod layout;
pub mod recompute;

use crate::jvm::{ClassHierarchy, MethodShape};
use crate::jvm::code::InsnStream;
use binding::CustomBinder;
use descriptor::AdviceDescriptor;
use dispatch::Dispatcher;
use errors::WeaveError;
use recompute::{recompute, validate_input_frames};

/// How advice bodies are dispatched at the join points
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum DispatchStrategy {
    /// Splice the advice body's instructions into the target, relocating
    /// its slots and branch targets
    Inlining,
    /// Call the advice body as a separate unit, binding arguments at the
    /// call site
    Delegating,
}

/// A method about to be instrumented
#[derive(Clone, Debug)]
pub struct TargetMethod {
    pub shape: MethodShape,
    pub stream: InsnStream,
}

/// A successfully woven method
///
/// The stream's frame map holds the recomputed frames for every branch
/// target and handler entry.
#[derive(Clone, Debug)]
pub struct WovenMethod {
    pub stream: InsnStream,
    pub max_stack: u16,
    pub max_locals: u16,
}

/// Entry point tying the pieces together
///
/// A weaver borrows a class hierarchy for assignability questions and owns
/// the registered custom binders. Weaving never mutates its inputs and
/// produces no output on any failure path.
pub struct Weaver<'g> {
    hierarchy: &'g ClassHierarchy<'g>,
    customs: Vec<(String, Box<dyn CustomBinder>)>,
}

impl<'g> Weaver<'g> {
    pub fn new(hierarchy: &'g ClassHierarchy<'g>) -> Self {
        Weaver {
            hierarchy,
            customs: vec![],
        }
    }

    /// Register a custom binder under its marker key
    pub fn register_custom(&mut self, marker: impl Into<String>, binder: Box<dyn CustomBinder>) {
        self.customs.push((marker.into(), binder));
    }

    /// Weave one advice descriptor into one target method
    pub fn weave(
        &self,
        descriptor: &AdviceDescriptor,
        strategy: DispatchStrategy,
        target: &TargetMethod,
    ) -> Result<WovenMethod, WeaveError> {
        validate_input_frames(&target.shape, &target.stream)?;

        let dispatcher = Dispatcher::new(descriptor, strategy, self.hierarchy, &self.customs);
        let resolved = dispatcher.resolve(&target.shape, &target.stream)?;
        let total_locals = resolved.layout.total_locals;
        let (mut stream, expected) = resolved.emit(&target.stream)?;

        let recomputed = recompute(
            &target.shape,
            total_locals,
            &stream,
            &expected,
            self.hierarchy,
        )?;
        stream.frames = recomputed.frames;

        log::debug!(
            "wove '{}' into {}.{}: {} -> {} instructions, max_stack {}, max_locals {}",
            descriptor.name(),
            target.shape.class,
            target.shape.name,
            target.stream.len(),
            stream.len(),
            recomputed.max_stack,
            recomputed.max_locals,
        );

        Ok(WovenMethod {
            stream,
            max_stack: recomputed.max_stack,
            max_locals: recomputed.max_locals,
        })
    }
}
