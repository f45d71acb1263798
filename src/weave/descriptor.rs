use crate::jvm::code::{InsnStream, UnitRef};
use crate::jvm::{FieldType, MethodAccessFlags};
use crate::weave::binding::{AdviceParam, Phase};
use crate::weave::control::AdviceControl;
use crate::weave::errors::ConfigError;
use elsa::map::FrozenMap;
use typed_arena::Arena;

/// One compiled advice body: a statically invocable unit plus its binding
/// table and control directives
#[derive(Clone, Debug)]
pub struct AdviceBody {
    pub phase: Phase,
    /// The unit's own shape; its return type is the phase's advised value
    pub unit: UnitRef,
    pub access: MethodAccessFlags,
    /// One entry per unit parameter, in order
    pub params: Vec<AdviceParam>,
    pub stream: InsnStream,
    pub control: AdviceControl,
}

impl AdviceBody {
    /// Type of the value this phase produces, if any
    pub fn value_type(&self) -> Option<&FieldType> {
        self.unit.return_type.as_ref()
    }
}

/// Compiled advice: at most one enter body and one exit body
///
/// Built once through the validating constructor and shared read-only
/// across every method it is applied to.
#[derive(Clone, Debug)]
pub struct AdviceDescriptor {
    name: String,
    enter: Option<AdviceBody>,
    exit: Option<AdviceBody>,
}

impl AdviceDescriptor {
    pub fn new(
        name: impl Into<String>,
        bodies: Vec<AdviceBody>,
    ) -> Result<AdviceDescriptor, ConfigError> {
        if bodies.is_empty() {
            return Err(ConfigError::NoAdviceBody);
        }

        let mut enter = None;
        let mut exit = None;
        for body in bodies {
            if !body.access.contains(MethodAccessFlags::STATIC) {
                return Err(ConfigError::NonStaticAdvice {
                    unit: body.unit.name.clone(),
                });
            }
            if body.params.len() != body.unit.parameters.len() {
                return Err(ConfigError::ParameterCountMismatch {
                    declared: body.params.len(),
                    parameters: body.unit.parameters.len(),
                });
            }
            match body.phase {
                Phase::Enter => {
                    if body.control.repeat.is_some() {
                        return Err(ConfigError::RepeatOnEnterAdvice);
                    }
                    if body.control.on_throwable.is_some() {
                        return Err(ConfigError::ExceptionFilterOnEnterAdvice);
                    }
                    if body.control.skip.is_some() && body.value_type().is_none() {
                        return Err(ConfigError::SkipRequiresValue);
                    }
                    if enter.replace(body).is_some() {
                        return Err(ConfigError::DuplicateEnterAdvice);
                    }
                }
                Phase::Exit => {
                    if body.control.skip.is_some() {
                        return Err(ConfigError::SkipOnExitAdvice);
                    }
                    if body.control.repeat.is_some() && body.value_type().is_none() {
                        return Err(ConfigError::RepeatRequiresValue);
                    }
                    if exit.replace(body).is_some() {
                        return Err(ConfigError::DuplicateExitAdvice);
                    }
                }
            }
        }

        Ok(AdviceDescriptor {
            name: name.into(),
            enter,
            exit,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enter(&self) -> Option<&AdviceBody> {
        self.enter.as_ref()
    }

    pub fn exit(&self) -> Option<&AdviceBody> {
        self.exit.as_ref()
    }

    /// Type of the enter value carried across the phases, if any
    pub fn enter_value_type(&self) -> Option<&FieldType> {
        self.enter.as_ref().and_then(|body| body.value_type())
    }
}

/// Arena backing an [`AdviceRegistry`]
pub struct AdviceArenas {
    descriptor_arena: Arena<AdviceDescriptor>,
}

impl AdviceArenas {
    pub fn new() -> Self {
        AdviceArenas {
            descriptor_arena: Arena::new(),
        }
    }
}

impl Default for AdviceArenas {
    fn default() -> Self {
        Self::new()
    }
}

/// Name-keyed registry of compiled descriptors
pub struct AdviceRegistry<'g> {
    arenas: &'g AdviceArenas,
    by_name: FrozenMap<String, &'g AdviceDescriptor>,
}

impl<'g> AdviceRegistry<'g> {
    pub fn new(arenas: &'g AdviceArenas) -> Self {
        AdviceRegistry {
            arenas,
            by_name: FrozenMap::new(),
        }
    }

    pub fn register(
        &'g self,
        descriptor: AdviceDescriptor,
    ) -> Result<&'g AdviceDescriptor, ConfigError> {
        if self.by_name.get(descriptor.name()).is_some() {
            return Err(ConfigError::DuplicateAdviceName(descriptor.name().to_owned()));
        }
        let key = descriptor.name().to_owned();
        let descriptor = &*self.arenas.descriptor_arena.alloc(descriptor);
        self.by_name.insert(key, descriptor);
        Ok(descriptor)
    }

    pub fn lookup(&'g self, name: &str) -> Option<&'g AdviceDescriptor> {
        self.by_name.get(name)
    }
}
