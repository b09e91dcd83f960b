//! Per-class structural model and the concurrent cache that owns it.
//!
//! A class is analyzed once per (loader, name). Ancestors are looked up by
//! name through the cache, analyzing them on a miss; a missing ancestor
//! contributes nothing. Concurrent first requests may each compute a model,
//! but only the first one published is ever handed out.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::advice::Advice;
use crate::compose::{MixinType, ShimAttachment};
use crate::config::RuleSet;
use crate::conflict::Conflict;
use crate::ir::{ClassAccess, MethodAccess, RawClass, RawMethod};
use crate::matcher;
use crate::pointcut::MethodFacts;
use crate::registry::{AdviceRegistry, Snapshot};

/// Identity of a defining class loader.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LoaderId(String);

impl LoaderId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache key: defining loader plus class name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassKey {
    pub loader: LoaderId,
    pub name: String,
}

impl ClassKey {
    pub fn new(loader: LoaderId, name: impl Into<String>) -> Self {
        Self {
            loader,
            name: name.into(),
        }
    }
}

/// Structural facts for a class together with its defining loader.
#[derive(Clone, Debug)]
pub struct LocatedClass {
    pub loader: LoaderId,
    pub class: Arc<RawClass>,
}

/// Host lookup for ancestor facts, following the host's loader delegation.
pub trait ClassSource: Send + Sync {
    fn locate(&self, loader: &LoaderId, name: &str) -> Option<LocatedClass>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum MethodOrigin {
    Declared,
    /// Subclass-local override of an inherited method, woven only here.
    Override { inherited_from: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct MethodSignature {
    pub name: String,
    pub descriptor: String,
}

#[derive(Clone, Debug)]
pub struct AnalyzedMethod {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) parameter_types: Vec<String>,
    pub(crate) return_type: String,
    pub(crate) access: MethodAccess,
    pub(crate) signature: Option<String>,
    pub(crate) exceptions: Vec<String>,
    pub(crate) annotations: Vec<String>,
    pub(crate) advisors: Vec<Arc<Advice>>,
    pub(crate) deferred: Vec<Arc<Advice>>,
    pub(crate) origin: MethodOrigin,
    pub(crate) malformed: bool,
}

impl AnalyzedMethod {
    pub(crate) fn declared(
        method: &RawMethod,
        parameter_types: Vec<String>,
        return_type: String,
    ) -> Self {
        Self {
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            parameter_types,
            return_type,
            access: method.access,
            signature: method.signature.clone(),
            exceptions: method.exceptions.clone(),
            annotations: method.annotations.clone(),
            advisors: Vec::new(),
            deferred: Vec::new(),
            origin: MethodOrigin::Declared,
            malformed: false,
        }
    }

    /// Declared method whose descriptor could not be parsed. It is kept in the
    /// model but never matched, inherited or looked up by signature.
    pub(crate) fn malformed(method: &RawMethod) -> Self {
        Self {
            malformed: true,
            ..Self::declared(method, Vec::new(), String::new())
        }
    }

    /// Copy of an inherited method re-declared in a subclass to carry `advisors`.
    pub(crate) fn override_of(
        inherited: &AnalyzedMethod,
        inherited_from: &str,
        advisors: Vec<Arc<Advice>>,
    ) -> Self {
        Self {
            advisors,
            deferred: Vec::new(),
            origin: MethodOrigin::Override {
                inherited_from: inherited_from.to_string(),
            },
            ..inherited.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn parameter_types(&self) -> &[String] {
        &self.parameter_types
    }

    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    pub fn access(&self) -> MethodAccess {
        self.access
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn exceptions(&self) -> &[String] {
        &self.exceptions
    }

    pub fn annotations(&self) -> &[String] {
        &self.annotations
    }

    /// Advice woven into this method, in execution order.
    pub fn advisors(&self) -> &[Arc<Advice>] {
        &self.advisors
    }

    /// Advice that matched except for a sub-type restriction.
    pub fn deferred_advisors(&self) -> &[Arc<Advice>] {
        &self.deferred
    }

    pub fn origin(&self) -> &MethodOrigin {
        &self.origin
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    /// Visible to and overridable by subclasses.
    pub fn is_inheritable(&self) -> bool {
        self.access.is_overridable() && !self.name.starts_with('<')
    }

    pub fn is_malformed(&self) -> bool {
        self.malformed
    }

    pub fn has_signature(&self, name: &str, parameter_types: &[String]) -> bool {
        !self.malformed && self.name == name && self.parameter_types == parameter_types
    }

    pub fn method_signature(&self) -> MethodSignature {
        MethodSignature {
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
        }
    }

    pub(crate) fn facts(&self) -> MethodFacts<'_> {
        MethodFacts {
            name: &self.name,
            parameter_types: &self.parameter_types,
            return_type: &self.return_type,
            annotations: &self.annotations,
            is_public: self.access.is_public,
            is_static: self.access.is_static,
        }
    }
}

/// Structural model of one loaded class. Never mutated once published.
#[derive(Debug)]
pub struct AnalyzedClass {
    pub(crate) loader: LoaderId,
    pub(crate) name: String,
    pub(crate) access: ClassAccess,
    pub(crate) super_name: Option<String>,
    pub(crate) interfaces: Vec<String>,
    pub(crate) annotations: Vec<String>,
    pub(crate) ancestors: Vec<String>,
    pub(crate) methods: Vec<AnalyzedMethod>,
    pub(crate) public_final_methods: Vec<MethodSignature>,
    pub(crate) mixins: Vec<Arc<MixinType>>,
    pub(crate) shims: Vec<ShimAttachment>,
    pub(crate) conflicts: Vec<Conflict>,
    /// Some conflict was raised for reweavable advice.
    pub(crate) reweavable_conflicts: bool,
    pub(crate) generation: u64,
}

impl AnalyzedClass {
    pub fn key(&self) -> ClassKey {
        ClassKey::new(self.loader.clone(), self.name.clone())
    }

    pub fn loader(&self) -> &LoaderId {
        &self.loader
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access(&self) -> ClassAccess {
        self.access
    }

    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn annotations(&self) -> &[String] {
        &self.annotations
    }

    /// Resolved ancestor names: super-class line first, then interfaces in
    /// declaration order, each followed by its own ancestors.
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    pub fn methods(&self) -> &[AnalyzedMethod] {
        &self.methods
    }

    pub fn method(&self, name: &str, parameter_types: &[String]) -> Option<&AnalyzedMethod> {
        self.methods
            .iter()
            .find(|method| method.has_signature(name, parameter_types))
    }

    pub fn public_final_methods(&self) -> &[MethodSignature] {
        &self.public_final_methods
    }

    pub fn mixins(&self) -> &[Arc<MixinType>] {
        &self.mixins
    }

    pub fn shims(&self) -> &[ShimAttachment] {
        &self.shims
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Generation of the advice snapshot this model was built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a reweave must drop this model: it carries reweavable advice,
    /// or reports a conflict raised by one.
    pub fn has_reweavable_advice(&self) -> bool {
        self.reweavable_conflicts
            || self.methods.iter().any(|method| {
                method
                    .advisors
                    .iter()
                    .chain(&method.deferred)
                    .any(|advice| advice.is_reweavable())
            })
    }
}

/// Builds and caches [`AnalyzedClass`] models.
pub struct HierarchyAnalyzer<S> {
    source: S,
    registry: Arc<AdviceRegistry>,
    cache: RwLock<HashMap<ClassKey, Arc<AnalyzedClass>>>,
}

impl<S: ClassSource> HierarchyAnalyzer<S> {
    pub fn new(source: S, registry: Arc<AdviceRegistry>) -> Self {
        Self {
            source,
            registry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &AdviceRegistry {
        &self.registry
    }

    /// Entry point for the class-loading hook.
    pub fn analyze(&self, loader: &LoaderId, class: &RawClass) -> Arc<AnalyzedClass> {
        let mut visiting = Vec::new();
        self.analyze_with(loader, class, &mut visiting)
    }

    /// Model for an ancestor name as seen from `loader`, analyzing it if needed.
    pub fn resolve(&self, loader: &LoaderId, name: &str) -> Option<Arc<AnalyzedClass>> {
        let mut visiting = Vec::new();
        self.resolve_with(loader, name, &mut visiting)
    }

    pub fn cached(&self, key: &ClassKey) -> Option<Arc<AnalyzedClass>> {
        self.cache.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    /// Publish a new rule set and drop cached models that carried
    /// reweavable advice. Returns the dropped keys, sorted.
    pub fn reweave(&self, rules: RuleSet) -> Vec<ClassKey> {
        let snapshot = Snapshot::compile(rules);
        let mut cache = self.cache.write();
        let published = self.registry.publish(snapshot);
        let mut stale: Vec<ClassKey> = cache
            .iter()
            .filter(|(_, class)| class.has_reweavable_advice())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            cache.remove(key);
        }
        stale.sort();
        info!(
            generation = published.generation(),
            invalidated = stale.len(),
            "reweave invalidated cached classes"
        );
        stale
    }

    /// Forget every class defined by `loader`; returns how many were dropped.
    pub fn evict_loader(&self, loader: &LoaderId) -> usize {
        let mut cache = self.cache.write();
        let before = cache.len();
        cache.retain(|key, _| &key.loader != loader);
        let evicted = before - cache.len();
        info!(%loader, evicted, "evicted classes of unreachable loader");
        evicted
    }

    fn analyze_with(
        &self,
        loader: &LoaderId,
        class: &RawClass,
        visiting: &mut Vec<ClassKey>,
    ) -> Arc<AnalyzedClass> {
        let key = ClassKey::new(loader.clone(), class.name.clone());
        if let Some(found) = self.cached(&key) {
            return found;
        }
        loop {
            let snapshot = self.registry.snapshot();
            visiting.push(key.clone());
            let hierarchy = self.resolve_hierarchy(loader, class, visiting);
            visiting.pop();

            let analyzed = Arc::new(matcher::analyze_class(loader, class, &hierarchy, &snapshot));

            let mut cache = self.cache.write();
            if let Some(existing) = cache.get(&key) {
                return Arc::clone(existing);
            }
            if snapshot.generation() != self.registry.generation()
                && analyzed.has_reweavable_advice()
            {
                debug!(class = %class.name, "advice snapshot changed during analysis; retrying");
                continue;
            }
            cache.insert(key, Arc::clone(&analyzed));
            return analyzed;
        }
    }

    fn resolve_with(
        &self,
        loader: &LoaderId,
        name: &str,
        visiting: &mut Vec<ClassKey>,
    ) -> Option<Arc<AnalyzedClass>> {
        if let Some(found) = self.cached(&ClassKey::new(loader.clone(), name)) {
            return Some(found);
        }
        let located = self.source.locate(loader, name)?;
        let key = ClassKey::new(located.loader.clone(), name);
        if let Some(found) = self.cached(&key) {
            return Some(found);
        }
        if visiting.contains(&key) {
            warn!(class = name, loader = %located.loader, "cyclic class hierarchy; ancestor ignored");
            return None;
        }
        Some(self.analyze_with(&located.loader, &located.class, visiting))
    }

    fn resolve_hierarchy(
        &self,
        loader: &LoaderId,
        class: &RawClass,
        visiting: &mut Vec<ClassKey>,
    ) -> Vec<Arc<AnalyzedClass>> {
        let mut hierarchy: Vec<Arc<AnalyzedClass>> = Vec::new();
        for name in class.super_name.iter().chain(&class.interfaces) {
            let Some(direct) = self.resolve_with(loader, name, visiting) else {
                debug!(class = %class.name, ancestor = %name, "ancestor unresolvable; no contribution");
                continue;
            };
            let transitive: Vec<Arc<AnalyzedClass>> = direct
                .ancestors
                .iter()
                .filter_map(|ancestor| self.resolve_with(&direct.loader, ancestor, visiting))
                .collect();
            push_unique(&mut hierarchy, direct);
            for ancestor in transitive {
                push_unique(&mut hierarchy, ancestor);
            }
        }
        hierarchy
    }
}

fn push_unique(hierarchy: &mut Vec<Arc<AnalyzedClass>>, class: Arc<AnalyzedClass>) {
    if !hierarchy.iter().any(|existing| existing.name == class.name) {
        hierarchy.push(class);
    }
}
