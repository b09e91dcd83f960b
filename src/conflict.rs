use serde::Serialize;

/// Recoverable configuration problem found while weaving one class.
///
/// Conflicts never abort analysis: the offending advice, mixin or proxy is
/// skipped and the conflict is logged and kept on the analyzed class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Conflict {
    #[error(
        "advice {advice} cannot override final method {class}.{method}{descriptor} declared in {declared_in}"
    )]
    FinalOverride {
        class: String,
        method: String,
        descriptor: String,
        declared_in: String,
        advice: String,
    },
    #[error("mixin {second} on {class} contributes {interface}, already provided by {first}")]
    MixinInterfaceCollision {
        class: String,
        interface: String,
        first: String,
        second: String,
    },
    #[error("shim {interface} on {class}: proxy {method} has no target method {target}")]
    ShimTargetMissing {
        class: String,
        interface: String,
        method: String,
        target: String,
    },
    #[error("advice {advice} skipped on {class}.{method}{descriptor}: {reason}")]
    UnbindableParameter {
        class: String,
        method: String,
        descriptor: String,
        advice: String,
        reason: String,
    },
    #[error("{reason}")]
    RejectedAdvice { advice: String, reason: String },
    #[error("mixin id {mixin} is already registered")]
    DuplicateMixin { mixin: String },
}

impl Conflict {
    pub fn rule_id(&self) -> &'static str {
        match self {
            Conflict::FinalOverride { .. } => "final-override",
            Conflict::MixinInterfaceCollision { .. } => "mixin-interface-collision",
            Conflict::ShimTargetMissing { .. } => "shim-target-missing",
            Conflict::UnbindableParameter { .. } => "unbindable-parameter",
            Conflict::RejectedAdvice { .. } => "rejected-advice",
            Conflict::DuplicateMixin { .. } => "duplicate-mixin",
        }
    }

    /// Class, and method with descriptor where one is involved.
    pub fn location(&self) -> Option<(&str, Option<(&str, &str)>)> {
        match self {
            Conflict::FinalOverride {
                class,
                method,
                descriptor,
                ..
            }
            | Conflict::UnbindableParameter {
                class,
                method,
                descriptor,
                ..
            } => Some((class.as_str(), Some((method.as_str(), descriptor.as_str())))),
            Conflict::MixinInterfaceCollision { class, .. }
            | Conflict::ShimTargetMissing { class, .. } => Some((class.as_str(), None)),
            Conflict::RejectedAdvice { .. } | Conflict::DuplicateMixin { .. } => None,
        }
    }

    /// Advice id the conflict was raised for, if it concerns one advice.
    pub fn advice(&self) -> Option<&str> {
        match self {
            Conflict::FinalOverride { advice, .. }
            | Conflict::UnbindableParameter { advice, .. }
            | Conflict::RejectedAdvice { advice, .. } => Some(advice.as_str()),
            Conflict::MixinInterfaceCollision { .. }
            | Conflict::ShimTargetMissing { .. }
            | Conflict::DuplicateMixin { .. } => None,
        }
    }

    pub(crate) fn report(self) -> Self {
        tracing::warn!(rule = self.rule_id(), "{self}");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_kind_tag() {
        let conflict = Conflict::MixinInterfaceCollision {
            class: "app.Order".to_string(),
            interface: "agent.HasTrace".to_string(),
            first: "trace-mixin".to_string(),
            second: "other-mixin".to_string(),
        };

        let value = serde_json::to_value(&conflict).expect("serialize conflict");

        assert_eq!(value["kind"], "mixin_interface_collision");
        assert_eq!(value["interface"], "agent.HasTrace");
        assert_eq!(conflict.rule_id(), "mixin-interface-collision");
        assert_eq!(conflict.location(), Some(("app.Order", None)));
    }

    #[test]
    fn message_names_the_method() {
        let conflict = Conflict::FinalOverride {
            class: "app.C".to_string(),
            method: "m".to_string(),
            descriptor: "()V".to_string(),
            declared_in: "app.A".to_string(),
            advice: "x".to_string(),
        };

        assert_eq!(
            conflict.to_string(),
            "advice x cannot override final method app.C.m()V declared in app.A"
        );
    }
}
