use crate::jvm::{BaseType, ClassName, FieldAccessFlags, FieldType};
use elsa::map::FrozenMap;
use elsa::FrozenVec;
use std::fmt;
use typed_arena::Arena;

/// Arenas backing a [`ClassHierarchy`]
///
/// Splitting the arenas out of the hierarchy itself lets the hierarchy hand
/// out plain `&'g` references while still being extendable behind a shared
/// reference.
pub struct HierarchyArenas<'g> {
    class_arena: Arena<ClassInfo<'g>>,
    field_arena: Arena<FieldInfo>,
}

impl<'g> HierarchyArenas<'g> {
    pub fn new() -> Self {
        HierarchyArenas {
            class_arena: Arena::new(),
            field_arena: Arena::new(),
        }
    }
}

impl<'g> Default for HierarchyArenas<'g> {
    fn default() -> Self {
        Self::new()
    }
}

/// Class registered in the hierarchy
pub struct ClassInfo<'g> {
    pub name: ClassName,

    /// `None` only for `java/lang/Object`
    pub superclass: Option<&'g ClassInfo<'g>>,

    /// Directly implemented interfaces
    pub interfaces: FrozenVec<&'g ClassInfo<'g>>,

    /// Declared fields
    pub fields: FrozenVec<&'g FieldInfo>,
}

impl<'g> fmt::Debug for ClassInfo<'g> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClassInfo")
            .field("name", &self.name)
            .finish()
    }
}

/// Field declared on a registered class
#[derive(Debug)]
pub struct FieldInfo {
    pub name: String,
    pub ty: FieldType,
    pub access: FieldAccessFlags,
}

impl FieldInfo {
    pub fn is_static(&self) -> bool {
        self.access.contains(FieldAccessFlags::STATIC)
    }

    pub fn is_final(&self) -> bool {
        self.access.contains(FieldAccessFlags::FINAL)
    }
}

/// Subtyping oracle for reference types
///
/// The binding resolver and the frame recomputer both need to answer "is this
/// reference type assignable to that one", which requires knowing superclass
/// and interface edges. Classes the weaver has not been told about are treated
/// as assignable only to themselves and to `java/lang/Object`.
pub struct ClassHierarchy<'g> {
    arenas: &'g HierarchyArenas<'g>,
    classes: FrozenMap<String, &'g ClassInfo<'g>>,
}

impl<'g> ClassHierarchy<'g> {
    /// New hierarchy, pre-seeded with the core Java library types the weaver
    /// itself reasons about (boxed primitives and the throwable chain)
    pub fn new(arenas: &'g HierarchyArenas<'g>) -> Self {
        let hierarchy = ClassHierarchy {
            arenas,
            classes: FrozenMap::new(),
        };

        let object = hierarchy.add_class(ClassName::OBJECT, None);
        let number = hierarchy.add_class(ClassName::NUMBER, Some(object));
        for base in BaseType::ALL {
            let superclass = match base {
                BaseType::Boolean | BaseType::Char => object,
                _ => number,
            };
            hierarchy.add_class(base.boxed(), Some(superclass));
        }
        let throwable = hierarchy.add_class(ClassName::THROWABLE, Some(object));
        let exception = hierarchy.add_class(ClassName::EXCEPTION, Some(throwable));
        hierarchy.add_class(ClassName::RUNTIME_EXCEPTION, Some(exception));

        hierarchy
    }

    /// Register a class
    ///
    /// Registering a name twice makes the newer entry the one lookups find.
    pub fn add_class(
        &self,
        name: ClassName,
        superclass: Option<&'g ClassInfo<'g>>,
    ) -> &'g ClassInfo<'g> {
        let key = name.as_str().to_owned();
        let info = &*self.arenas.class_arena.alloc(ClassInfo {
            name,
            superclass,
            interfaces: FrozenVec::new(),
            fields: FrozenVec::new(),
        });
        self.classes.insert(key, info);
        info
    }

    /// Register a field on an already registered class
    pub fn add_field(&self, class: &'g ClassInfo<'g>, field: FieldInfo) -> &'g FieldInfo {
        let field = &*self.arenas.field_arena.alloc(field);
        class.fields.push(field);
        field
    }

    pub fn lookup(&'g self, name: &ClassName) -> Option<&'g ClassInfo<'g>> {
        self.classes.get(name.as_str())
    }

    /// Find a field by name on the class or one of its superclasses
    pub fn lookup_field(&'g self, class: &ClassName, name: &str) -> Option<&'g FieldInfo> {
        let mut current = self.lookup(class);
        while let Some(info) = current {
            if let Some(field) = info.fields.iter().find(|f| f.name == name) {
                return Some(field);
            }
            current = info.superclass;
        }
        None
    }

    /// Is a value of class `sub` assignable to a variable of class `sup`?
    pub fn is_class_assignable(&'g self, sub: &ClassName, sup: &ClassName) -> bool {
        if sub == sup || *sup == ClassName::OBJECT {
            return true;
        }
        let mut worklist = match self.lookup(sub) {
            Some(info) => vec![info],
            None => return false,
        };
        while let Some(info) = worklist.pop() {
            if info.name == *sup {
                return true;
            }
            if let Some(superclass) = info.superclass {
                worklist.push(superclass);
            }
            for interface in info.interfaces.iter() {
                worklist.push(interface);
            }
        }
        false
    }

    /// Reference assignability over full field types
    ///
    /// This matches the shape of the JVM verifier's `isJavaAssignable`
    /// predicate: arrays are covariant in their (reference) element type,
    /// primitive arrays must match exactly, and every array is assignable to
    /// `java/lang/Object`.
    pub fn is_assignable(&'g self, sub: &FieldType, sup: &FieldType) -> bool {
        match (sub, sup) {
            (FieldType::Base(b1), FieldType::Base(b2)) => b1 == b2,
            (FieldType::Object(c1), FieldType::Object(c2)) => self.is_class_assignable(c1, c2),
            (FieldType::Array(_), FieldType::Object(c)) => *c == ClassName::OBJECT,
            (FieldType::Array(e1), FieldType::Array(e2)) => match (&**e1, &**e2) {
                (FieldType::Base(b1), FieldType::Base(b2)) => b1 == b2,
                (e1, e2) if e1.is_reference() && e2.is_reference() => self.is_assignable(e1, e2),
                _ => false,
            },
            _ => false,
        }
    }
}
