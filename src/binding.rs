use serde::Serialize;

use crate::advice::{Advice, ParameterKind, Stage};
use crate::hierarchy::AnalyzedMethod;

/// Concrete value the generated code passes for one handle parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DataSource {
    Receiver,
    Argument { index: usize, type_name: String },
    ArgumentArray,
    MethodName { name: String },
    ReturnValue { type_name: String },
    /// `OPTIONAL_RETURN` on a method returning void.
    VoidReturn,
    Throwable,
    Traveler { slot: usize },
    ClassMeta { type_name: String, slot: usize },
    MethodMeta { type_name: String, slot: usize },
    ThreadContext,
    OptionalThreadContext,
}

/// Resolved parameter list for one stage handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StageBinding {
    pub stage: Stage,
    pub handle: String,
    pub sources: Vec<DataSource>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BindingConflict {
    #[error("RECEIVER cannot bind on a static method")]
    StaticReceiver,
    #[error("RETURN cannot bind on a void method")]
    VoidReturn,
    #[error("METHOD_ARG #{index} is past the method's {arity} parameters")]
    ArgumentOutOfRange { index: usize, arity: usize },
    #[error("{kind:?} has no metadata type")]
    MissingMetaType { kind: ParameterKind },
    #[error("TRAVELER bound without a traveler slot")]
    MissingTravelerSlot,
}

/// Slot table for cached class- or method-level metadata instances.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetaSlots {
    types: Vec<String>,
}

impl MetaSlots {
    pub fn slot(&mut self, type_name: &str) -> usize {
        if let Some(index) = self.types.iter().position(|known| known == type_name) {
            return index;
        }
        self.types.push(type_name.to_string());
        self.types.len() - 1
    }

    pub fn into_types(self) -> Vec<String> {
        self.types
    }
}

/// Map every parameter of every stage handle of `advice` onto `method`.
///
/// The n-th `METHOD_ARG` of a handle binds the n-th method argument.
pub fn resolve(
    advice: &Advice,
    method: &AnalyzedMethod,
    traveler_slot: Option<usize>,
    class_meta: &mut MetaSlots,
    method_meta: &mut MetaSlots,
) -> Result<Vec<StageBinding>, BindingConflict> {
    let mut stages = Vec::new();
    for (stage, handle) in advice.handles().iter() {
        let mut next_argument = 0;
        let mut sources = Vec::with_capacity(handle.parameters.len());
        for parameter in &handle.parameters {
            let source = match parameter.kind {
                ParameterKind::Receiver if method.access().is_static => {
                    return Err(BindingConflict::StaticReceiver);
                }
                ParameterKind::Receiver => DataSource::Receiver,
                ParameterKind::MethodArg => {
                    let index = next_argument;
                    next_argument += 1;
                    let arity = method.parameter_types().len();
                    let type_name = method
                        .parameter_types()
                        .get(index)
                        .ok_or(BindingConflict::ArgumentOutOfRange { index, arity })?;
                    DataSource::Argument {
                        index,
                        type_name: type_name.clone(),
                    }
                }
                ParameterKind::MethodArgArray => DataSource::ArgumentArray,
                ParameterKind::MethodName => DataSource::MethodName {
                    name: method.name().to_string(),
                },
                ParameterKind::Return if method.return_type() == "void" => {
                    return Err(BindingConflict::VoidReturn);
                }
                ParameterKind::Return => DataSource::ReturnValue {
                    type_name: method.return_type().to_string(),
                },
                ParameterKind::OptionalReturn if method.return_type() == "void" => {
                    DataSource::VoidReturn
                }
                ParameterKind::OptionalReturn => DataSource::ReturnValue {
                    type_name: method.return_type().to_string(),
                },
                ParameterKind::Throwable => DataSource::Throwable,
                ParameterKind::Traveler => DataSource::Traveler {
                    slot: traveler_slot.ok_or(BindingConflict::MissingTravelerSlot)?,
                },
                ParameterKind::ClassMeta => {
                    let type_name = meta_type(parameter.meta_type.as_deref(), parameter.kind)?;
                    DataSource::ClassMeta {
                        slot: class_meta.slot(type_name),
                        type_name: type_name.to_string(),
                    }
                }
                ParameterKind::MethodMeta => {
                    let type_name = meta_type(parameter.meta_type.as_deref(), parameter.kind)?;
                    DataSource::MethodMeta {
                        slot: method_meta.slot(type_name),
                        type_name: type_name.to_string(),
                    }
                }
                ParameterKind::ThreadContext => DataSource::ThreadContext,
                ParameterKind::OptionalThreadContext => DataSource::OptionalThreadContext,
            };
            sources.push(source);
        }
        stages.push(StageBinding {
            stage,
            handle: handle.handle.clone(),
            sources,
        });
    }
    Ok(stages)
}

fn meta_type(meta_type: Option<&str>, kind: ParameterKind) -> Result<&str, BindingConflict> {
    meta_type.ok_or(BindingConflict::MissingMetaType { kind })
}
