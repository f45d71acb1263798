use crate::jvm::code::{Emitter, Insn};
use crate::jvm::{BaseType, ClassHierarchy, FieldType};

/// How aggressively values are coerced between bound state and advice
/// parameters
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Typing {
    /// Only conversions the source language would perform implicitly
    Static,
    /// Also runtime-checked conversions (downcasts, cast-then-unbox)
    Dynamic,
}

/// Conversion applied to a value as it crosses a binding
///
/// A coercion is computed once during resolution and replayed as (zero or
/// more) instructions at every site the binding is read or written.
#[derive(Clone, PartialEq, Debug)]
pub enum Coercion {
    Identity,
    /// Widening primitive conversion
    Widen { from: BaseType, to: BaseType },
    /// Wrap a primitive in its box class
    Box(BaseType),
    /// Unwrap a box whose static type already names the wrapper
    Unbox(BaseType),
    /// Downcast a general reference to the wrapper, then unwrap it
    CastUnbox(BaseType),
    /// Reference widening, no instruction needed
    Upcast,
    /// Runtime-checked reference narrowing
    Downcast(FieldType),
}

impl Coercion {
    pub fn emit(&self, emitter: &mut Emitter) {
        match self {
            Coercion::Identity | Coercion::Upcast => {}
            Coercion::Widen { from, to } => {
                // Widening inside the int category is representation-free
                if from.local_kind() != to.local_kind() {
                    emitter.push(Insn::Widen {
                        from: *from,
                        to: *to,
                    });
                }
            }
            Coercion::Box(base) => emitter.push(Insn::BoxPrim(*base)),
            Coercion::Unbox(base) => emitter.push(Insn::UnboxPrim(*base)),
            Coercion::CastUnbox(base) => {
                emitter.push(Insn::CheckCast(FieldType::object(base.boxed())));
                emitter.push(Insn::UnboxPrim(*base));
            }
            Coercion::Downcast(ty) => emitter.push(Insn::CheckCast(ty.clone())),
        }
    }
}

/// Coercion for a value of type `from` flowing into a variable of type `to`,
/// or `None` when the assignment is not expressible
pub fn assign<'g>(
    from: &FieldType,
    to: &FieldType,
    typing: Typing,
    hierarchy: &'g ClassHierarchy<'g>,
) -> Option<Coercion> {
    if from == to {
        return Some(Coercion::Identity);
    }
    match (from, to) {
        (FieldType::Base(f), FieldType::Base(t)) => {
            if f.widens_to(*t) {
                Some(Coercion::Widen { from: *f, to: *t })
            } else {
                None
            }
        }
        (FieldType::Base(f), FieldType::Object(c)) => {
            if hierarchy.is_class_assignable(&f.boxed(), c) {
                Some(Coercion::Box(*f))
            } else {
                None
            }
        }
        (FieldType::Object(c), FieldType::Base(t)) => {
            if *c == t.boxed() {
                Some(Coercion::Unbox(*t))
            } else if typing == Typing::Dynamic && hierarchy.is_class_assignable(&t.boxed(), c) {
                Some(Coercion::CastUnbox(*t))
            } else {
                None
            }
        }
        (from, to) if from.is_reference() && to.is_reference() => {
            if hierarchy.is_assignable(from, to) {
                Some(Coercion::Upcast)
            } else if typing == Typing::Dynamic {
                Some(Coercion::Downcast(to.clone()))
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{ClassName, HierarchyArenas};

    #[test]
    fn primitive_assignments() {
        let arenas = HierarchyArenas::new();
        let hierarchy = ClassHierarchy::new(&arenas);

        assert_eq!(
            assign(
                &FieldType::int(),
                &FieldType::int(),
                Typing::Static,
                &hierarchy
            ),
            Some(Coercion::Identity)
        );
        assert_eq!(
            assign(
                &FieldType::int(),
                &FieldType::long(),
                Typing::Static,
                &hierarchy
            ),
            Some(Coercion::Widen {
                from: BaseType::Int,
                to: BaseType::Long
            })
        );
        assert_eq!(
            assign(
                &FieldType::long(),
                &FieldType::int(),
                Typing::Dynamic,
                &hierarchy
            ),
            None
        );
    }

    #[test]
    fn boxing_assignments() {
        let arenas = HierarchyArenas::new();
        let hierarchy = ClassHierarchy::new(&arenas);

        assert_eq!(
            assign(
                &FieldType::int(),
                &FieldType::object(ClassName::INTEGER),
                Typing::Static,
                &hierarchy
            ),
            Some(Coercion::Box(BaseType::Int))
        );
        assert_eq!(
            assign(
                &FieldType::int(),
                &FieldType::object(ClassName::NUMBER),
                Typing::Static,
                &hierarchy
            ),
            Some(Coercion::Box(BaseType::Int))
        );
        assert_eq!(
            assign(
                &FieldType::object(ClassName::INTEGER),
                &FieldType::int(),
                Typing::Static,
                &hierarchy
            ),
            Some(Coercion::Unbox(BaseType::Int))
        );
        // Needs a runtime check, so only the dynamic typing allows it
        assert_eq!(
            assign(
                &FieldType::object(ClassName::OBJECT),
                &FieldType::int(),
                Typing::Static,
                &hierarchy
            ),
            None
        );
        assert_eq!(
            assign(
                &FieldType::object(ClassName::OBJECT),
                &FieldType::int(),
                Typing::Dynamic,
                &hierarchy
            ),
            Some(Coercion::CastUnbox(BaseType::Int))
        );
    }

    #[test]
    fn reference_assignments() {
        let arenas = HierarchyArenas::new();
        let hierarchy = ClassHierarchy::new(&arenas);

        let integer = FieldType::object(ClassName::INTEGER);
        let number = FieldType::object(ClassName::NUMBER);

        assert_eq!(
            assign(&integer, &number, Typing::Static, &hierarchy),
            Some(Coercion::Upcast)
        );
        assert_eq!(assign(&number, &integer, Typing::Static, &hierarchy), None);
        assert_eq!(
            assign(&number, &integer, Typing::Dynamic, &hierarchy),
            Some(Coercion::Downcast(integer))
        );
    }

    #[test]
    fn widen_emission_skips_int_category_moves() {
        let mut emitter = Emitter::new();
        Coercion::Widen {
            from: BaseType::Byte,
            to: BaseType::Int,
        }
        .emit(&mut emitter);
        Coercion::Widen {
            from: BaseType::Int,
            to: BaseType::Long,
        }
        .emit(&mut emitter);
        let (stream, _) = emitter.finish().unwrap();
        assert_eq!(
            stream.insns,
            vec![Insn::Widen {
                from: BaseType::Int,
                to: BaseType::Long
            }]
        );
    }
}
