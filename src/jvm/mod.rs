//! Model of the JVM surface the weaver works against: types and value
//! categories, method shapes, the class hierarchy oracle, the instruction
//! stream representation, and verification frames.

pub mod code;
pub mod frame;
mod hierarchy;
mod shape;
mod types;

pub use hierarchy::{ClassHierarchy, ClassInfo, FieldInfo, HierarchyArenas};
pub use shape::{FieldAccessFlags, MethodAccessFlags, MethodShape};
pub use types::{BaseType, ClassName, ConstValue, FieldType, LocalKind};
