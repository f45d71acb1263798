//! Instrumentation weaver for JVM-style method bodies.
//!
//! Given a target method (shape, instruction stream, recorded verification
//! frames) and a compiled advice descriptor (an optional enter body and an
//! optional exit body, each with a binding table and control directives),
//! the weaver produces a rewritten stream with recomputed verification
//! frames, or fails fast with a typed error and no partial output.
//!
//! The pieces, bottom up:
//!
//!   - [`jvm`] models the target surface: types and categories, method
//!     shapes, a class hierarchy oracle, the instruction stream, frames
//!   - [`weave`] resolves bindings to storage locations, lays out the
//!     appended frame slots, emits via an inlining or delegating
//!     dispatcher, and recomputes the verification metadata

pub mod jvm;
pub mod util;
pub mod weave;

pub use weave::errors::{BindError, ConfigError, StructuralError, WeaveError};
pub use weave::{DispatchStrategy, TargetMethod, Weaver, WovenMethod};
