use crate::jvm::code::FieldRef;
use crate::jvm::{ClassHierarchy, ClassName, FieldType, MethodShape};
use crate::weave::coercion::{assign, Coercion, Typing};
use crate::weave::errors::BindError;
use crate::weave::DispatchStrategy;

/// Which half of the woven method an advice body runs in
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Phase {
    Enter,
    Exit,
}

/// Declarative request an advice parameter makes for target-method state
///
/// This is the static analogue of the original system's binding annotations:
/// one exhaustively matched tag per parameter, populated when the descriptor
/// is built.
#[derive(Clone, PartialEq, Debug)]
pub enum BindingKind {
    /// The target argument with the given index
    Argument { index: u16 },
    /// The full argument vector as an array; boxed or typed follows from the
    /// declared element type
    AllArguments,
    Receiver,
    /// The value the woven method is going to return (exit phase)
    Return,
    /// The throwable on the exceptional path, or null (exit phase)
    Thrown,
    /// Whatever the enter body produced (exit phase)
    Enter,
    /// The original body's own terminal value, untouched by exit advice
    Exit,
    /// Parameter receives its type's default; writes are discarded
    Unused,
    /// A field of the instrumented type, by name
    FieldValue {
        name: String,
        /// Explicit declaring class; defaults to the target's own
        declaring: Option<ClassName>,
    },
    /// Resolved by a registered [`CustomBinder`] keyed on this marker
    Custom { marker: String },
}

/// One advice parameter: its binding, declared type, and coercion mode
#[derive(Clone, PartialEq, Debug)]
pub struct AdviceParam {
    pub kind: BindingKind,
    pub ty: FieldType,
    pub read_only: bool,
    pub typing: Typing,
}

impl AdviceParam {
    pub fn read_only(kind: BindingKind, ty: FieldType) -> AdviceParam {
        AdviceParam {
            kind,
            ty,
            read_only: true,
            typing: Typing::Static,
        }
    }

    pub fn writable(kind: BindingKind, ty: FieldType) -> AdviceParam {
        AdviceParam {
            kind,
            ty,
            read_only: false,
            typing: Typing::Static,
        }
    }

    pub fn dynamic(mut self) -> AdviceParam {
        self.typing = Typing::Dynamic;
        self
    }
}

/// Concrete storage a binding resolved to
///
/// Slots are assigned later, by the frame layout; the location only names
/// which piece of state is meant.
#[derive(Clone, PartialEq, Debug)]
pub enum StorageLocation {
    Receiver,
    Argument { index: u16 },
    /// Freshly built array over all arguments
    ArgumentVector,
    Return,
    Thrown,
    Enter,
    Exit,
    Field { field: FieldRef, is_static: bool },
    Unused,
}

/// Per-element plan for an [`StorageLocation::ArgumentVector`] binding
#[derive(Clone, PartialEq, Debug)]
pub struct VectorPlan {
    pub element: FieldType,
    /// Coercion applied to each argument as it is stored into the array
    pub reads: Vec<Coercion>,
    /// Coercions applied writing elements back to the argument slots, when
    /// the binding is writable
    pub writes: Option<Vec<Coercion>>,
}

/// A binding resolved against one concrete target method
#[derive(Clone, PartialEq, Debug)]
pub struct ResolvedBinding {
    pub location: StorageLocation,
    pub declared: FieldType,
    pub read_only: bool,
    /// Coercion from the stored value to the declared parameter type
    pub read: Coercion,
    /// Coercion from the declared type back to storage, for writable bindings
    pub write: Option<Coercion>,
    pub vector: Option<VectorPlan>,
}

/// Extension point for author-supplied bindings
///
/// A binder either claims a marker (returning the location the parameter
/// should be bound to) or declines. Exactly one registered binder must claim
/// each custom marker a descriptor uses.
pub trait CustomBinder: Send + Sync {
    fn bind(
        &self,
        shape: &MethodShape,
        phase: Phase,
        declared: &FieldType,
    ) -> Option<StorageLocation>;
}

/// Type of the value stored at a location, or `None` when the location has
/// no state (unused, or a value slot the target does not have)
fn location_type(
    location: &StorageLocation,
    shape: &MethodShape,
    enter_type: Option<&FieldType>,
) -> Option<FieldType> {
    match location {
        StorageLocation::Receiver => Some(FieldType::object(shape.class.clone())),
        StorageLocation::Argument { index } => shape.argument_type(*index).cloned(),
        StorageLocation::ArgumentVector => None,
        StorageLocation::Return | StorageLocation::Exit => shape.return_type.clone(),
        StorageLocation::Thrown => Some(FieldType::object(ClassName::THROWABLE)),
        StorageLocation::Enter => enter_type.cloned(),
        StorageLocation::Field { field, .. } => Some(field.ty.clone()),
        StorageLocation::Unused => None,
    }
}

/// Resolve every parameter of one advice phase against a target method
///
/// Fails before anything is emitted; a `Vec` comes back only when the whole
/// table resolved. Resolution is deterministic: the same descriptor against
/// the same shape always produces the same table.
#[allow(clippy::too_many_arguments)]
pub fn resolve_bindings<'g>(
    shape: &MethodShape,
    phase: Phase,
    strategy: DispatchStrategy,
    params: &[AdviceParam],
    enter_type: Option<&FieldType>,
    hierarchy: &'g ClassHierarchy<'g>,
    customs: &[(String, Box<dyn CustomBinder>)],
) -> Result<Vec<ResolvedBinding>, BindError> {
    let mut resolved = Vec::with_capacity(params.len());
    for (parameter, param) in params.iter().enumerate() {
        let binding = resolve_one(
            shape, phase, strategy, parameter, param, enter_type, hierarchy, customs,
        )?;
        resolved.push(binding);
    }
    Ok(resolved)
}

#[allow(clippy::too_many_arguments)]
fn resolve_one<'g>(
    shape: &MethodShape,
    phase: Phase,
    strategy: DispatchStrategy,
    parameter: usize,
    param: &AdviceParam,
    enter_type: Option<&FieldType>,
    hierarchy: &'g ClassHierarchy<'g>,
    customs: &[(String, Box<dyn CustomBinder>)],
) -> Result<ResolvedBinding, BindError> {
    let location = match &param.kind {
        BindingKind::Argument { index } => {
            if shape.argument_type(*index).is_none() {
                return Err(BindError::ArgumentOutOfRange {
                    index: *index,
                    arguments: shape.parameters.len(),
                });
            }
            StorageLocation::Argument { index: *index }
        }
        BindingKind::AllArguments => {
            return resolve_vector(shape, strategy, parameter, param, hierarchy)
        }
        BindingKind::Receiver => {
            if shape.is_static() {
                return Err(BindError::ReceiverOnStaticMethod { parameter });
            }
            if phase == Phase::Enter && shape.is_constructor() {
                return Err(BindError::ReceiverOnConstructorEnter { parameter });
            }
            StorageLocation::Receiver
        }
        BindingKind::Return => {
            if phase != Phase::Exit {
                return Err(BindError::ExitOnlyBinding { parameter });
            }
            match shape.return_type {
                Some(_) => StorageLocation::Return,
                // A void target has no return state; the parameter falls
                // back to its declared default
                None => StorageLocation::Unused,
            }
        }
        BindingKind::Thrown => {
            if phase != Phase::Exit {
                return Err(BindError::ExitOnlyBinding { parameter });
            }
            StorageLocation::Thrown
        }
        BindingKind::Enter => {
            if phase != Phase::Exit {
                return Err(BindError::ExitOnlyBinding { parameter });
            }
            match enter_type {
                Some(_) => StorageLocation::Enter,
                None => StorageLocation::Unused,
            }
        }
        BindingKind::Exit => {
            if phase != Phase::Exit {
                return Err(BindError::ExitOnlyBinding { parameter });
            }
            if !param.read_only {
                return Err(BindError::ReadOnlyBinding { parameter });
            }
            match shape.return_type {
                Some(_) => StorageLocation::Exit,
                None => StorageLocation::Unused,
            }
        }
        BindingKind::Unused => StorageLocation::Unused,
        BindingKind::FieldValue { name, declaring } => {
            let owner = declaring.clone().unwrap_or_else(|| shape.class.clone());
            let field = hierarchy
                .lookup_field(&owner, name)
                .ok_or_else(|| BindError::UnknownField {
                    field: name.clone(),
                })?;
            if !param.read_only && field.is_final() {
                return Err(BindError::ReadOnlyBinding { parameter });
            }
            StorageLocation::Field {
                field: FieldRef {
                    owner,
                    name: name.clone(),
                    ty: field.ty.clone(),
                },
                is_static: field.is_static(),
            }
        }
        BindingKind::Custom { marker } => {
            let mut claimed = None;
            for (key, binder) in customs {
                if key != marker {
                    continue;
                }
                if let Some(location) = binder.bind(shape, phase, &param.ty) {
                    if claimed.is_some() {
                        return Err(BindError::AmbiguousCustomBinding {
                            parameter,
                            marker: marker.clone(),
                        });
                    }
                    claimed = Some(location);
                }
            }
            claimed.ok_or_else(|| BindError::UnresolvedCustomBinding {
                parameter,
                marker: marker.clone(),
            })?
        }
    };

    let stored = location_type(&location, shape, enter_type);
    let (read, write) = match &stored {
        Some(stored) => {
            let read = assign(stored, &param.ty, param.typing, hierarchy).ok_or_else(|| {
                BindError::NotAssignable {
                    parameter,
                    from: stored.clone(),
                    to: param.ty.clone(),
                }
            })?;
            let write = if param.read_only {
                None
            } else {
                Some(
                    assign(&param.ty, stored, param.typing, hierarchy).ok_or_else(|| {
                        BindError::NotAssignable {
                            parameter,
                            from: param.ty.clone(),
                            to: stored.clone(),
                        }
                    })?,
                )
            };
            (read, write)
        }
        // Stateless location: reads produce the declared default and writes
        // have nowhere to go
        None => (Coercion::Identity, None),
    };

    if strategy == DispatchStrategy::Delegating && write.is_some() {
        return Err(BindError::WritableBindingInDelegation { parameter });
    }

    Ok(ResolvedBinding {
        location,
        declared: param.ty.clone(),
        read_only: param.read_only,
        read,
        write,
        vector: None,
    })
}

fn resolve_vector<'g>(
    shape: &MethodShape,
    strategy: DispatchStrategy,
    parameter: usize,
    param: &AdviceParam,
    hierarchy: &'g ClassHierarchy<'g>,
) -> Result<ResolvedBinding, BindError> {
    let element = match &param.ty {
        FieldType::Array(element) => (**element).clone(),
        other => {
            return Err(BindError::NotAssignable {
                parameter,
                from: FieldType::array(FieldType::object(ClassName::OBJECT)),
                to: other.clone(),
            })
        }
    };

    let mut reads = Vec::with_capacity(shape.parameters.len());
    let mut writes = (!param.read_only).then(Vec::new);
    for argument in &shape.parameters {
        let read = assign(argument, &element, param.typing, hierarchy).ok_or_else(|| {
            BindError::NotAssignable {
                parameter,
                from: argument.clone(),
                to: element.clone(),
            }
        })?;
        reads.push(read);
        if let Some(writes) = &mut writes {
            let write = assign(&element, argument, param.typing, hierarchy).ok_or_else(|| {
                BindError::NotAssignable {
                    parameter,
                    from: element.clone(),
                    to: argument.clone(),
                }
            })?;
            writes.push(write);
        }
    }

    if strategy == DispatchStrategy::Delegating && writes.is_some() {
        return Err(BindError::WritableBindingInDelegation { parameter });
    }

    Ok(ResolvedBinding {
        location: StorageLocation::ArgumentVector,
        declared: param.ty.clone(),
        read_only: param.read_only,
        read: Coercion::Identity,
        write: None,
        vector: Some(VectorPlan {
            element,
            reads,
            writes,
        }),
    })
}
