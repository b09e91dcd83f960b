//! Serializable weaving plan handed to the external code generator.

use serde::Serialize;

use crate::binding::{self, BindingConflict, MetaSlots, StageBinding};
use crate::compose::{MixinType, ShimAttachment};
use crate::conflict::Conflict;
use crate::hierarchy::{AnalyzedClass, LoaderId, MethodOrigin, MethodSignature};
use crate::ordering;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeavingPlan {
    pub loader: LoaderId,
    pub class_name: String,
    /// Some woven advice may be swapped out by a later reweave.
    pub reweavable: bool,
    pub methods: Vec<MethodPlan>,
    /// Class-level metadata types, indexed by `CLASS_META` slot.
    pub class_meta: Vec<String>,
    pub mixins: Vec<MixinType>,
    pub shims: Vec<ShimAttachment>,
    pub public_final_methods: Vec<MethodSignature>,
    pub conflicts: Vec<Conflict>,
}

impl WeavingPlan {
    /// Nothing for the generator to do.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.mixins.is_empty() && self.shims.is_empty()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodPlan {
    pub name: String,
    pub descriptor: String,
    /// Set when the generator must synthesize an override of an inherited method.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_of: Option<String>,
    pub advice: Vec<PlannedAdvice>,
    /// Indices into `advice` for isEnabled and onBefore.
    pub enter_order: Vec<usize>,
    /// Indices into `advice` for onReturn, onThrow and onAfter.
    pub exit_order: Vec<usize>,
    pub method_meta: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedAdvice {
    pub id: String,
    pub order: i32,
    pub timer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traveler_slot: Option<usize>,
    pub thread_context: bool,
    pub stages: Vec<StageBinding>,
}

#[derive(Debug, thiserror::Error)]
pub enum WeaveError {
    #[error("advice {advice} no longer binds to {class}.{method}{descriptor}")]
    Binding {
        class: String,
        method: String,
        descriptor: String,
        advice: String,
        #[source]
        source: BindingConflict,
    },
}

/// Resolve the binding plan for every woven method of `class`.
pub fn build(class: &AnalyzedClass) -> Result<WeavingPlan, WeaveError> {
    let mut class_meta = MetaSlots::default();
    let mut methods = Vec::new();

    for method in class.methods() {
        if !method.access().has_body() || method.advisors().is_empty() {
            continue;
        }
        let mut advisors = method.advisors().to_vec();
        ordering::sort(&mut advisors);

        let mut method_meta = MetaSlots::default();
        let mut next_traveler = 0;
        let mut advice = Vec::with_capacity(advisors.len());
        for advisor in &advisors {
            let traveler_slot = advisor.uses_traveler().then(|| {
                next_traveler += 1;
                next_traveler - 1
            });
            let stages = binding::resolve(
                advisor,
                method,
                traveler_slot,
                &mut class_meta,
                &mut method_meta,
            )
            .map_err(|source| WeaveError::Binding {
                class: class.name().to_string(),
                method: method.name().to_string(),
                descriptor: method.descriptor().to_string(),
                advice: advisor.id().to_string(),
                source,
            })?;
            advice.push(PlannedAdvice {
                id: advisor.id().to_string(),
                order: advisor.order(),
                timer_name: advisor.timer_name().to_string(),
                traveler_slot,
                thread_context: advisor.binds_thread_context(),
                stages,
            });
        }

        methods.push(MethodPlan {
            name: method.name().to_string(),
            descriptor: method.descriptor().to_string(),
            override_of: match method.origin() {
                MethodOrigin::Declared => None,
                MethodOrigin::Override { inherited_from } => Some(inherited_from.clone()),
            },
            enter_order: ordering::entry_sequence(advice.len()),
            exit_order: ordering::exit_sequence(advice.len()),
            advice,
            method_meta: method_meta.into_types(),
        });
    }

    Ok(WeavingPlan {
        loader: class.loader().clone(),
        class_name: class.name().to_string(),
        reweavable: class.has_reweavable_advice(),
        methods,
        class_meta: class_meta.into_types(),
        mixins: class.mixins().iter().map(|mixin| (**mixin).clone()).collect(),
        shims: class.shims().to_vec(),
        public_final_methods: class.public_final_methods().to_vec(),
        conflicts: class.conflicts().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::binding::DataSource;
    use crate::config::parse_rules;
    use crate::hierarchy::HierarchyAnalyzer;
    use crate::registry::{AdviceRegistry, Snapshot};
    use crate::test_support::{MapSource, class, method};

    const RULES: &str = r#"{ "advice": [
        { "id": "timer", "pointcut": { "className": "app.Dao", "methodName": "find*",
                                       "methodParameterTypes": [".."], "order": 5,
                                       "timerName": "dao", "reweavable": true },
          "onBefore": { "handle": "agent.Timer#start", "returnsTraveler": true,
                        "parameters": [{ "kind": "THREAD_CONTEXT" }] },
          "onAfter": { "handle": "agent.Timer#stop", "parameters": [{ "kind": "TRAVELER" }] } },
        { "id": "args", "pointcut": { "className": "app.Dao", "methodName": "find*",
                                      "methodParameterTypes": [".."] },
          "onBefore": { "handle": "agent.Args#log",
                        "parameters": [{ "kind": "METHOD_ARG" },
                                       { "kind": "CLASS_META", "metaType": "agent.DaoMeta" },
                                       { "kind": "METHOD_META", "metaType": "agent.QueryMeta" }] } }
    ] }"#;

    fn plan_for(raw: crate::ir::RawClass) -> WeavingPlan {
        let rules = parse_rules(RULES).expect("parse rules");
        let registry = Arc::new(AdviceRegistry::new(Snapshot::compile(rules)));
        let analyzer = HierarchyAnalyzer::new(MapSource::new(Vec::new()), registry);
        let analyzed = analyzer.analyze(&LoaderId::new("app"), &raw);
        build(&analyzed).expect("build plan")
    }

    #[test]
    fn plan_orders_advice_and_assigns_slots() {
        let plan = plan_for(class(
            "app.Dao",
            None,
            &[],
            vec![
                method("findById", "(J)Ljava/lang/Object;"),
                method("findByName", "(Ljava/lang/String;)Ljava/lang/Object;"),
                method("save", "(Ljava/lang/Object;)V"),
            ],
        ));

        assert!(plan.reweavable);
        assert_eq!(plan.methods.len(), 2);
        assert_eq!(plan.class_meta, vec!["agent.DaoMeta"]);

        let find = &plan.methods[0];
        let ids: Vec<&str> = find.advice.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["args", "timer"]);
        assert_eq!(find.enter_order, vec![0, 1]);
        assert_eq!(find.exit_order, vec![1, 0]);
        assert_eq!(find.method_meta, vec!["agent.QueryMeta"]);
        assert_eq!(find.advice[1].traveler_slot, Some(0));
        assert!(find.advice[1].thread_context);
        assert_eq!(
            find.advice[0].stages[0].sources[0],
            DataSource::Argument {
                index: 0,
                type_name: "long".to_string()
            }
        );
        assert_eq!(
            plan.methods[1].advice[0].stages[0].sources[1],
            DataSource::ClassMeta {
                type_name: "agent.DaoMeta".to_string(),
                slot: 0
            }
        );
    }

    #[test]
    fn unbindable_advice_leaves_method_out_of_plan() {
        let plan = plan_for(class("app.Dao", None, &[], vec![method("findAll", "()Ljava/util/List;")]));

        let ids: Vec<&str> = plan.methods[0].advice.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["timer"]);
        assert_eq!(plan.conflicts.len(), 1);
        assert!(!plan.is_empty());
    }

    #[test]
    fn abstract_methods_are_not_planned() {
        let mut find = method("findById", "(J)Ljava/lang/Object;");
        find.access.is_abstract = true;

        let plan = plan_for(class("app.Dao", None, &[], vec![find]));

        assert!(plan.is_empty());
    }

    #[test]
    fn plan_serializes_camel_case() {
        let plan = plan_for(class("app.Dao", None, &[], vec![method("findById", "(J)V")]));

        let json = serde_json::to_value(&plan).expect("serialize plan");

        assert_eq!(json["className"], "app.Dao");
        assert_eq!(json["methods"][0]["exitOrder"], serde_json::json!([1, 0]));
        assert_eq!(
            json["methods"][0]["advice"][0]["stages"][0]["stage"],
            "onBefore"
        );
    }
}
