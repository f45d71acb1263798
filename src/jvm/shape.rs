use crate::jvm::{ClassName, FieldType};
use crate::util::{packed_slot, total_width};
use bitflags::bitflags;

bitflags! {
    /// Access flags on methods
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6-200-A.1
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    /// Access flags on fields
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5-200-A.1
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
    }
}

/// Declared shape of a method: everything the weaver needs to know about a
/// target without seeing its instruction stream
///
/// The shape fixes the implicit frame prefix (receiver followed by the
/// arguments, packed by category width) and the original frame size, both of
/// which the layout computation builds on.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MethodShape {
    /// Declaring class (also the receiver type for instance methods)
    pub class: ClassName,

    /// Method name (`<init>` marks a constructor)
    pub name: String,

    pub access: MethodAccessFlags,

    /// Ordered argument types, excluding any receiver
    pub parameters: Vec<FieldType>,

    /// `None` for `void`
    pub return_type: Option<FieldType>,

    /// Declared throwable types
    pub throws: Vec<ClassName>,

    /// Frame size the method was compiled with (receiver + arguments + body
    /// locals)
    pub max_locals: u16,
}

impl MethodShape {
    pub const CONSTRUCTOR_NAME: &'static str = "<init>";

    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == Self::CONSTRUCTOR_NAME
    }

    /// Slot holding the receiver, if there is one
    pub fn receiver_slot(&self) -> Option<u16> {
        if self.is_static() {
            None
        } else {
            Some(0)
        }
    }

    /// Combined width of the receiver and argument slots
    pub fn implicit_width(&self) -> u16 {
        let receiver = if self.is_static() { 0 } else { 1 };
        receiver + total_width(&self.parameters) as u16
    }

    /// Slot of the argument with the given index
    pub fn argument_slot(&self, index: u16) -> Option<u16> {
        let receiver = if self.is_static() { 0 } else { 1 };
        packed_slot(&self.parameters, index as usize).map(|slot| receiver + slot as u16)
    }

    pub fn argument_type(&self, index: u16) -> Option<&FieldType> {
        self.parameters.get(index as usize)
    }
}
