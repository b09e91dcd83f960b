//! Matching advice against one class and its resolved ancestors.

use std::collections::HashSet;
use std::iter;
use std::sync::Arc;

use tracing::warn;

use crate::advice::Advice;
use crate::binding::{self, MetaSlots};
use crate::compose::{self, ClassView};
use crate::conflict::Conflict;
use crate::descriptor;
use crate::hierarchy::{AnalyzedClass, AnalyzedMethod, LoaderId, MethodSignature};
use crate::ir::{RawClass, RawMethod};
use crate::ordering;
use crate::registry::Snapshot;

/// Build the model of `raw` from its resolved ancestors and the current advice.
///
/// `hierarchy` lists every resolved ancestor once, super-class line first.
pub(crate) fn analyze_class(
    loader: &LoaderId,
    raw: &RawClass,
    hierarchy: &[Arc<AnalyzedClass>],
    snapshot: &Snapshot,
) -> AnalyzedClass {
    let super_chain = super_chain(raw, hierarchy);
    let type_names: Vec<&str> = iter::once(raw.name.as_str())
        .chain(hierarchy.iter().map(|class| class.name()))
        .collect();
    let annotations: Vec<&str> = raw
        .annotations
        .iter()
        .chain(hierarchy.iter().flat_map(|class| class.annotations()))
        .map(String::as_str)
        .collect();
    let candidates: Vec<&Arc<Advice>> = snapshot
        .advisors()
        .iter()
        .filter(|advice| advice.pointcut().matches_class(&type_names, &annotations))
        .collect();

    let context = MatchContext {
        class_name: &raw.name,
        type_names: &type_names,
        hierarchy,
        candidates: &candidates,
    };
    let mut conflicts = Vec::new();
    let mut methods: Vec<AnalyzedMethod> = raw
        .methods
        .iter()
        .map(|method| context.declared_method(method, &mut conflicts))
        .collect();

    let public_final_methods = public_final_methods(raw, &methods, &super_chain);
    let overrides =
        context.inherited_overrides(&methods, &super_chain, &public_final_methods, &mut conflicts);
    methods.extend(overrides);

    let composition = compose::compose(
        &ClassView {
            name: &raw.name,
            access: raw.access,
            interfaces: &raw.interfaces,
            type_names: &type_names,
            super_chain: &super_chain,
            methods: &methods,
        },
        snapshot,
    );
    conflicts.extend(composition.conflicts);
    let reweavable_conflicts = conflicts
        .iter()
        .filter_map(Conflict::advice)
        .any(|id| {
            snapshot
                .advisors()
                .iter()
                .any(|advice| advice.id() == id && advice.is_reweavable())
        });

    AnalyzedClass {
        loader: loader.clone(),
        name: raw.name.clone(),
        access: raw.access,
        super_name: raw.super_name.clone(),
        interfaces: raw.interfaces.clone(),
        annotations: raw.annotations.clone(),
        ancestors: hierarchy.iter().map(|class| class.name().to_string()).collect(),
        methods,
        public_final_methods,
        mixins: composition.mixins,
        shims: composition.shims,
        conflicts,
        reweavable_conflicts,
        generation: snapshot.generation(),
    }
}

struct MatchContext<'a> {
    class_name: &'a str,
    type_names: &'a [&'a str],
    hierarchy: &'a [Arc<AnalyzedClass>],
    candidates: &'a [&'a Arc<Advice>],
}

impl MatchContext<'_> {
    fn declared_method(&self, method: &RawMethod, conflicts: &mut Vec<Conflict>) -> AnalyzedMethod {
        let shape = match descriptor::parse_method(&method.descriptor) {
            Ok(shape) => shape,
            Err(error) => {
                warn!(
                    class = self.class_name,
                    method = %method.name,
                    descriptor = %method.descriptor,
                    %error,
                    "malformed method descriptor; method left unwoven"
                );
                return AnalyzedMethod::malformed(method);
            }
        };
        let mut analyzed = AnalyzedMethod::declared(method, shape.parameter_types, shape.return_type);
        if method.access.is_bridge || method.access.is_synthetic || method.is_static_initializer() {
            return analyzed;
        }

        let mut found = self.direct_matches(&analyzed);
        if analyzed.is_inheritable() {
            found.extend(self.ancestor_advice(&analyzed.name, &analyzed.parameter_types));
        }
        dedup_by_id(&mut found);

        let (advisors, mut deferred): (Vec<_>, Vec<_>) = found
            .into_iter()
            .partition(|advice| advice.pointcut().sub_type_satisfied(self.type_names));
        let mut advisors = self.bindable(&analyzed, advisors, conflicts);
        ordering::sort(&mut advisors);
        ordering::sort(&mut deferred);
        analyzed.advisors = advisors;
        analyzed.deferred = deferred;
        analyzed
    }

    /// Overrides for inherited methods that only now have advice to weave.
    fn inherited_overrides(
        &self,
        declared: &[AnalyzedMethod],
        super_chain: &[Arc<AnalyzedClass>],
        public_final_methods: &[MethodSignature],
        conflicts: &mut Vec<Conflict>,
    ) -> Vec<AnalyzedMethod> {
        let mut overrides = Vec::new();
        let mut visited: HashSet<(&str, &[String])> = declared
            .iter()
            .filter(|method| !method.is_malformed())
            .map(|method| (method.name(), method.parameter_types()))
            .collect();

        for ancestor in super_chain {
            for inherited in ancestor.methods() {
                if inherited.is_malformed()
                    || !inherited.is_inheritable()
                    || !visited.insert((inherited.name(), inherited.parameter_types()))
                {
                    continue;
                }
                let access = inherited.access();
                if !access.has_body() || access.is_bridge || access.is_synthetic {
                    continue;
                }

                let woven: HashSet<&str> = super_chain
                    .iter()
                    .filter_map(|class| class.method(inherited.name(), inherited.parameter_types()))
                    .flat_map(|method| method.advisors().iter().map(|advice| advice.id()))
                    .collect();
                let mut fresh = self.direct_matches(inherited);
                fresh.extend(self.ancestor_advice(inherited.name(), inherited.parameter_types()));
                dedup_by_id(&mut fresh);
                fresh.retain(|advice| {
                    advice.pointcut().sub_type_satisfied(self.type_names)
                        && !woven.contains(advice.id())
                });
                if fresh.is_empty() {
                    continue;
                }

                if access.is_final || public_final_methods.contains(&inherited.method_signature()) {
                    conflicts.extend(fresh.iter().map(|advice| {
                        Conflict::FinalOverride {
                            class: self.class_name.to_string(),
                            method: inherited.name().to_string(),
                            descriptor: inherited.descriptor().to_string(),
                            declared_in: ancestor.name().to_string(),
                            advice: advice.id().to_string(),
                        }
                        .report()
                    }));
                    continue;
                }

                let mut advisors = self.bindable(inherited, fresh, conflicts);
                if advisors.is_empty() {
                    continue;
                }
                ordering::sort(&mut advisors);
                overrides.push(AnalyzedMethod::override_of(inherited, ancestor.name(), advisors));
            }
        }
        overrides
    }

    fn direct_matches(&self, method: &AnalyzedMethod) -> Vec<Arc<Advice>> {
        let facts = method.facts();
        self.candidates
            .iter()
            .filter(|advice| advice.pointcut().matches_method(&facts))
            .map(|advice| Arc::clone(advice))
            .collect()
    }

    /// Advice and deferred advice recorded on ancestor methods with this signature.
    fn ancestor_advice(&self, name: &str, parameter_types: &[String]) -> Vec<Arc<Advice>> {
        self.hierarchy
            .iter()
            .filter_map(|class| class.method(name, parameter_types))
            .filter(|method| method.is_inheritable())
            .flat_map(|method| method.advisors().iter().chain(method.deferred_advisors()))
            .cloned()
            .collect()
    }

    fn bindable(
        &self,
        method: &AnalyzedMethod,
        advisors: Vec<Arc<Advice>>,
        conflicts: &mut Vec<Conflict>,
    ) -> Vec<Arc<Advice>> {
        advisors
            .into_iter()
            .filter(|advice| {
                let result = binding::resolve(
                    advice,
                    method,
                    Some(0),
                    &mut MetaSlots::default(),
                    &mut MetaSlots::default(),
                );
                match result {
                    Ok(_) => true,
                    Err(reason) => {
                        conflicts.push(
                            Conflict::UnbindableParameter {
                                class: self.class_name.to_string(),
                                method: method.name().to_string(),
                                descriptor: method.descriptor().to_string(),
                                advice: advice.id().to_string(),
                                reason: reason.to_string(),
                            }
                            .report(),
                        );
                        false
                    }
                }
            })
            .collect()
    }
}

/// Ancestors along the super-class line, nearest first.
fn super_chain(raw: &RawClass, hierarchy: &[Arc<AnalyzedClass>]) -> Vec<Arc<AnalyzedClass>> {
    let mut chain: Vec<Arc<AnalyzedClass>> = Vec::new();
    let mut next = raw.super_name.as_deref();
    while let Some(name) = next {
        if chain.iter().any(|class| class.name() == name) {
            break;
        }
        let Some(class) = hierarchy.iter().find(|class| class.name() == name) else {
            break;
        };
        chain.push(Arc::clone(class));
        next = class.super_name();
    }
    chain
}

fn public_final_methods(
    raw: &RawClass,
    methods: &[AnalyzedMethod],
    super_chain: &[Arc<AnalyzedClass>],
) -> Vec<MethodSignature> {
    let mut signatures: Vec<MethodSignature> = methods
        .iter()
        .filter(|method| {
            let access = method.access();
            access.is_public && access.is_final && !access.is_static
        })
        .map(AnalyzedMethod::method_signature)
        .collect();
    if let Some(parent) = super_chain
        .first()
        .filter(|parent| raw.super_name.as_deref() == Some(parent.name()))
    {
        for signature in parent.public_final_methods() {
            if !signatures.contains(signature) {
                signatures.push(signature.clone());
            }
        }
    }
    signatures
}

fn dedup_by_id(advisors: &mut Vec<Arc<Advice>>) {
    let mut seen = HashSet::new();
    advisors.retain(|advice| seen.insert(advice.id().to_string()));
}
