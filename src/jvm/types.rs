use crate::util::Width;
use std::borrow::Cow;
use std::fmt;

/// Primitive value categories
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    /// All primitive categories, in a stable order (handy for category-sweeping tests)
    pub const ALL: [BaseType; 8] = [
        BaseType::Byte,
        BaseType::Char,
        BaseType::Double,
        BaseType::Float,
        BaseType::Int,
        BaseType::Long,
        BaseType::Short,
        BaseType::Boolean,
    ];

    /// Computational category used for loads, stores, and stack entries
    pub fn local_kind(&self) -> LocalKind {
        match self {
            BaseType::Byte
            | BaseType::Char
            | BaseType::Int
            | BaseType::Short
            | BaseType::Boolean => LocalKind::Int,
            BaseType::Float => LocalKind::Float,
            BaseType::Long => LocalKind::Long,
            BaseType::Double => LocalKind::Double,
        }
    }

    /// Boxed wrapper class for this primitive
    pub fn boxed(&self) -> ClassName {
        match self {
            BaseType::Byte => ClassName::BYTE,
            BaseType::Char => ClassName::CHARACTER,
            BaseType::Double => ClassName::DOUBLE,
            BaseType::Float => ClassName::FLOAT,
            BaseType::Int => ClassName::INTEGER,
            BaseType::Long => ClassName::LONG,
            BaseType::Short => ClassName::SHORT,
            BaseType::Boolean => ClassName::BOOLEAN,
        }
    }

    /// Primitive type whose boxed wrapper is the named class
    pub fn unboxing(class: &ClassName) -> Option<BaseType> {
        BaseType::ALL.iter().copied().find(|b| b.boxed() == *class)
    }

    /// Does a widening primitive conversion exist from `self` to `to`?
    ///
    /// This is the JLS 5.1.2 table. Note that `boolean` widens to nothing and
    /// nothing widens to `boolean`.
    pub fn widens_to(&self, to: BaseType) -> bool {
        use BaseType::*;
        if *self == to {
            return true;
        }
        match self {
            Byte => matches!(to, Short | Int | Long | Float | Double),
            Short => matches!(to, Int | Long | Float | Double),
            Char => matches!(to, Int | Long | Float | Double),
            Int => matches!(to, Long | Float | Double),
            Long => matches!(to, Float | Double),
            Float => matches!(to, Double),
            Double | Boolean => false,
        }
    }

    /// Zero/false value of this category
    pub fn default_const(&self) -> ConstValue {
        match self.local_kind() {
            LocalKind::Int => ConstValue::Int(0),
            LocalKind::Float => ConstValue::Float(0.0),
            LocalKind::Long => ConstValue::Long(0),
            LocalKind::Double => ConstValue::Double(0.0),
            LocalKind::Reference => unreachable!("primitives have primitive kinds"),
        }
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        self.local_kind().width()
    }
}

/// Computational category of a value in a frame slot or on the stack
///
/// The verifier does not distinguish the narrow integral categories, so
/// `boolean`/`byte`/`short`/`char`/`int` all collapse to `Int` here. The
/// category determines the slot width, which is why layouts never reinterpret
/// a slot under a different category.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum LocalKind {
    Int,
    Float,
    Long,
    Double,
    Reference,
}

impl LocalKind {
    pub fn is_wide(&self) -> bool {
        matches!(self, LocalKind::Long | LocalKind::Double)
    }
}

impl Width for LocalKind {
    fn width(&self) -> usize {
        if self.is_wide() {
            2
        } else {
            1
        }
    }
}

/// Binary class name (`java/lang/Object` style)
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClassName(Cow<'static, str>);

impl ClassName {
    pub const OBJECT: ClassName = ClassName(Cow::Borrowed("java/lang/Object"));
    pub const NUMBER: ClassName = ClassName(Cow::Borrowed("java/lang/Number"));
    pub const THROWABLE: ClassName = ClassName(Cow::Borrowed("java/lang/Throwable"));
    pub const EXCEPTION: ClassName = ClassName(Cow::Borrowed("java/lang/Exception"));
    pub const RUNTIME_EXCEPTION: ClassName =
        ClassName(Cow::Borrowed("java/lang/RuntimeException"));
    pub const BOOLEAN: ClassName = ClassName(Cow::Borrowed("java/lang/Boolean"));
    pub const BYTE: ClassName = ClassName(Cow::Borrowed("java/lang/Byte"));
    pub const CHARACTER: ClassName = ClassName(Cow::Borrowed("java/lang/Character"));
    pub const SHORT: ClassName = ClassName(Cow::Borrowed("java/lang/Short"));
    pub const INTEGER: ClassName = ClassName(Cow::Borrowed("java/lang/Integer"));
    pub const LONG: ClassName = ClassName(Cow::Borrowed("java/lang/Long"));
    pub const FLOAT: ClassName = ClassName(Cow::Borrowed("java/lang/Float"));
    pub const DOUBLE: ClassName = ClassName(Cow::Borrowed("java/lang/Double"));

    pub fn new(name: impl Into<String>) -> ClassName {
        ClassName(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ClassName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Field/parameter/return type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),
    Object(ClassName),
    /// Array with the given element type
    Array(Box<FieldType>),
}

impl FieldType {
    pub const fn int() -> FieldType {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType {
        FieldType::Base(BaseType::Long)
    }

    pub const fn boolean() -> FieldType {
        FieldType::Base(BaseType::Boolean)
    }

    pub fn object(class: ClassName) -> FieldType {
        FieldType::Object(class)
    }

    pub fn array(element: FieldType) -> FieldType {
        FieldType::Array(Box::new(element))
    }

    pub fn is_reference(&self) -> bool {
        !matches!(self, FieldType::Base(_))
    }

    pub fn local_kind(&self) -> LocalKind {
        match self {
            FieldType::Base(base) => base.local_kind(),
            FieldType::Object(_) | FieldType::Array(_) => LocalKind::Reference,
        }
    }

    /// Default value of this type (zero, false, or null)
    pub fn default_const(&self) -> ConstValue {
        match self {
            FieldType::Base(base) => base.default_const(),
            FieldType::Object(_) | FieldType::Array(_) => ConstValue::Null,
        }
    }

    /// If this is a boxed wrapper class, the primitive it boxes
    pub fn unboxed(&self) -> Option<BaseType> {
        match self {
            FieldType::Object(class) => BaseType::unboxing(class),
            _ => None,
        }
    }
}

impl Width for FieldType {
    fn width(&self) -> usize {
        self.local_kind().width()
    }
}

/// Literal constant that can be pushed onto the stack
///
/// Narrow integral categories all use the `Int` representation, matching
/// their computational category.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum ConstValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
}

impl ConstValue {
    pub fn local_kind(&self) -> LocalKind {
        match self {
            ConstValue::Int(_) => LocalKind::Int,
            ConstValue::Long(_) => LocalKind::Long,
            ConstValue::Float(_) => LocalKind::Float,
            ConstValue::Double(_) => LocalKind::Double,
            ConstValue::Null => LocalKind::Reference,
        }
    }

    /// Is this the default value of its category?
    pub fn is_default(&self) -> bool {
        match self {
            ConstValue::Int(i) => *i == 0,
            ConstValue::Long(l) => *l == 0,
            ConstValue::Float(f) => *f == 0.0,
            ConstValue::Double(d) => *d == 0.0,
            ConstValue::Null => true,
        }
    }
}
