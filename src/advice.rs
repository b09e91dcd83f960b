use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pointcut::PointcutSpec;

/// Data source kinds a stage handle parameter can ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterKind {
    Receiver,
    MethodArg,
    MethodArgArray,
    MethodName,
    Return,
    OptionalReturn,
    Throwable,
    Traveler,
    ClassMeta,
    MethodMeta,
    ThreadContext,
    OptionalThreadContext,
}

/// Interception points of one advice, in the order the generated code reaches them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    IsEnabled,
    OnBefore,
    OnReturn,
    OnThrow,
    OnAfter,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::IsEnabled,
        Stage::OnBefore,
        Stage::OnReturn,
        Stage::OnThrow,
        Stage::OnAfter,
    ];

    fn allows(self, kind: ParameterKind) -> bool {
        use ParameterKind::*;
        let common = matches!(
            kind,
            Receiver | MethodArg | MethodArgArray | MethodName | ClassMeta | MethodMeta
        );
        let context = matches!(kind, ThreadContext | OptionalThreadContext);
        match self {
            Stage::IsEnabled => common,
            Stage::OnBefore => common || context,
            Stage::OnReturn => {
                common || context || matches!(kind, Return | OptionalReturn | Traveler)
            }
            Stage::OnThrow => common || context || matches!(kind, Throwable | Traveler),
            Stage::OnAfter => common || context || kind == Traveler,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::IsEnabled => "isEnabled",
            Stage::OnBefore => "onBefore",
            Stage::OnReturn => "onReturn",
            Stage::OnThrow => "onThrow",
            Stage::OnAfter => "onAfter",
        };
        f.write_str(name)
    }
}

/// One declared parameter of a bound handle.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleParameter {
    pub kind: ParameterKind,
    /// Metadata type for `CLASS_META` / `METHOD_META`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_type: Option<String>,
}

/// An interception handle bound to one stage, with its ordered parameters.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageHandle {
    pub handle: String,
    #[serde(default)]
    pub parameters: Vec<HandleParameter>,
    #[serde(default)]
    pub returns_traveler: bool,
}

/// Handles supplied by the rule source for each stage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdviceHandles {
    pub is_enabled: Option<StageHandle>,
    pub on_before: Option<StageHandle>,
    pub on_return: Option<StageHandle>,
    pub on_throw: Option<StageHandle>,
    pub on_after: Option<StageHandle>,
}

impl AdviceHandles {
    pub fn get(&self, stage: Stage) -> Option<&StageHandle> {
        match stage {
            Stage::IsEnabled => self.is_enabled.as_ref(),
            Stage::OnBefore => self.on_before.as_ref(),
            Stage::OnReturn => self.on_return.as_ref(),
            Stage::OnThrow => self.on_throw.as_ref(),
            Stage::OnAfter => self.on_after.as_ref(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, &StageHandle)> {
        Stage::ALL
            .into_iter()
            .filter_map(|stage| self.get(stage).map(|handle| (stage, handle)))
    }
}

/// Reasons an advice definition cannot be compiled.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AdviceError {
    #[error("advice {advice}: {reason}")]
    InvalidPointcut { advice: String, reason: &'static str },
    #[error("advice {advice} declares no stage handles")]
    NoHandles { advice: String },
    #[error("advice {advice}: {stage} handle {handle} cannot bind {kind:?}")]
    IllegalBinding {
        advice: String,
        stage: Stage,
        handle: String,
        kind: ParameterKind,
    },
    #[error("advice {advice}: {stage} binds a traveler but onBefore returns none")]
    MissingTraveler { advice: String, stage: Stage },
    #[error("advice {advice}: only onBefore may return a traveler, not {stage}")]
    MisplacedTraveler { advice: String, stage: Stage },
    #[error("advice {advice}: {stage} binds {kind:?} without a metadata type")]
    MissingMetaType {
        advice: String,
        stage: Stage,
        kind: ParameterKind,
    },
    #[error("advice id {advice} is already registered")]
    DuplicateId { advice: String },
}

/// A compiled pointcut bound to its interception handles.
#[derive(Debug)]
pub struct Advice {
    id: String,
    pointcut: PointcutSpec,
    handles: AdviceHandles,
    uses_traveler: bool,
    binds_thread_context: bool,
    class_meta_types: BTreeSet<String>,
    method_meta_types: BTreeSet<String>,
    registration: usize,
}

impl Advice {
    /// Validate the handles against their stages and derive the metadata needs.
    pub fn compile(
        id: impl Into<String>,
        pointcut: PointcutSpec,
        handles: AdviceHandles,
        registration: usize,
    ) -> Result<Self, AdviceError> {
        let id = id.into();
        if let Some(reason) = pointcut.problem() {
            return Err(AdviceError::InvalidPointcut { advice: id, reason });
        }
        if handles.iter().next().is_none() {
            return Err(AdviceError::NoHandles { advice: id });
        }

        let uses_traveler = handles
            .on_before
            .as_ref()
            .is_some_and(|handle| handle.returns_traveler);
        let mut binds_thread_context = false;
        let mut class_meta_types = BTreeSet::new();
        let mut method_meta_types = BTreeSet::new();

        for (stage, handle) in handles.iter() {
            if handle.returns_traveler && stage != Stage::OnBefore {
                return Err(AdviceError::MisplacedTraveler { advice: id, stage });
            }
            for parameter in &handle.parameters {
                let kind = parameter.kind;
                if !stage.allows(kind) {
                    return Err(AdviceError::IllegalBinding {
                        advice: id,
                        stage,
                        handle: handle.handle.clone(),
                        kind,
                    });
                }
                match kind {
                    ParameterKind::Traveler if !uses_traveler => {
                        return Err(AdviceError::MissingTraveler { advice: id, stage });
                    }
                    ParameterKind::ThreadContext | ParameterKind::OptionalThreadContext => {
                        binds_thread_context = true;
                    }
                    ParameterKind::ClassMeta | ParameterKind::MethodMeta => {
                        let Some(meta_type) = parameter.meta_type.clone() else {
                            return Err(AdviceError::MissingMetaType {
                                advice: id,
                                stage,
                                kind,
                            });
                        };
                        if kind == ParameterKind::ClassMeta {
                            class_meta_types.insert(meta_type);
                        } else {
                            method_meta_types.insert(meta_type);
                        }
                    }
                    _ => {}
                }
            }
        }

        Ok(Self {
            id,
            pointcut,
            handles,
            uses_traveler,
            binds_thread_context,
            class_meta_types,
            method_meta_types,
            registration,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pointcut(&self) -> &PointcutSpec {
        &self.pointcut
    }

    pub fn handles(&self) -> &AdviceHandles {
        &self.handles
    }

    pub fn order(&self) -> i32 {
        self.pointcut.order
    }

    pub fn timer_name(&self) -> &str {
        &self.pointcut.timer_name
    }

    pub fn is_reweavable(&self) -> bool {
        self.pointcut.reweavable
    }

    pub fn uses_traveler(&self) -> bool {
        self.uses_traveler
    }

    pub fn binds_thread_context(&self) -> bool {
        self.binds_thread_context
    }

    pub fn class_meta_types(&self) -> &BTreeSet<String> {
        &self.class_meta_types
    }

    pub fn method_meta_types(&self) -> &BTreeSet<String> {
        &self.method_meta_types
    }

    /// Position in the rule source; the final ordering tie-breaker.
    pub fn registration(&self) -> usize {
        self.registration
    }
}
