use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conflict::Conflict;
use crate::hierarchy::{AnalyzedClass, AnalyzedMethod};
use crate::ir::ClassAccess;
use crate::pattern::NamePattern;
use crate::registry::Snapshot;

/// Extra interfaces and state attached to matching classes.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MixinType {
    pub id: String,
    pub targets: Vec<NamePattern>,
    pub interfaces: Vec<String>,
    /// Method run once per instance after construction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<String>,
    /// Opaque to the planner; handed to the generator as-is.
    #[serde(default)]
    pub implementation: String,
}

/// Adapter interface whose methods proxy onto differently named target methods.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShimType {
    pub interface: String,
    pub target: NamePattern,
    #[serde(default)]
    pub proxies: Vec<ShimProxy>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShimProxy {
    /// Method name on the shim interface.
    pub method: String,
    /// Method name on the target class.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShimAttachment {
    pub interface: String,
    pub proxies: Vec<ProxyBinding>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyBinding {
    pub method: String,
    /// `None` when no target method exists; the generator emits a default stub.
    pub target: Option<ProxyTarget>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyTarget {
    pub name: String,
    pub descriptor: String,
    pub declared_in: String,
}

/// What the composer needs to know about the class being woven.
pub(crate) struct ClassView<'a> {
    pub name: &'a str,
    pub access: ClassAccess,
    pub interfaces: &'a [String],
    /// The class itself followed by every resolved ancestor.
    pub type_names: &'a [&'a str],
    pub super_chain: &'a [Arc<AnalyzedClass>],
    pub methods: &'a [AnalyzedMethod],
}

#[derive(Debug, Default)]
pub(crate) struct Composition {
    pub mixins: Vec<Arc<MixinType>>,
    pub shims: Vec<ShimAttachment>,
    pub conflicts: Vec<Conflict>,
}

pub(crate) fn compose(class: &ClassView<'_>, snapshot: &Snapshot) -> Composition {
    let mut composition = Composition::default();
    if class.access.is_interface {
        return composition;
    }
    attach_mixins(class, snapshot, &mut composition);
    attach_shims(class, snapshot, &mut composition);
    composition
}

fn attach_mixins(class: &ClassView<'_>, snapshot: &Snapshot, composition: &mut Composition) {
    let mut claimed: HashMap<&str, &str> = HashMap::new();
    for mixin in snapshot.mixins() {
        let targeted = mixin
            .targets
            .iter()
            .any(|target| target.matches_any(class.type_names.iter().copied()));
        if !targeted {
            continue;
        }
        let inherited = class
            .super_chain
            .iter()
            .any(|ancestor| ancestor.mixins().iter().any(|attached| attached.id == mixin.id));
        if inherited {
            debug!(class = class.name, mixin = %mixin.id, "mixin inherited from super-class");
            continue;
        }

        let collision = mixin.interfaces.iter().find_map(|interface| {
            if let Some(first) = claimed.get(interface.as_str()) {
                Some((interface, first.to_string()))
            } else if implements(class, interface) {
                Some((interface, class.name.to_string()))
            } else {
                None
            }
        });
        if let Some((interface, first)) = collision {
            composition.conflicts.push(
                Conflict::MixinInterfaceCollision {
                    class: class.name.to_string(),
                    interface: interface.clone(),
                    first,
                    second: mixin.id.clone(),
                }
                .report(),
            );
            continue;
        }

        for interface in &mixin.interfaces {
            claimed.insert(interface, &mixin.id);
        }
        composition.mixins.push(Arc::clone(mixin));
    }
}

fn implements(class: &ClassView<'_>, interface: &str) -> bool {
    class.interfaces.iter().any(|declared| declared == interface)
        || class.type_names.iter().skip(1).any(|name| *name == interface)
}

fn attach_shims(class: &ClassView<'_>, snapshot: &Snapshot, composition: &mut Composition) {
    for shim in snapshot.shims() {
        if !shim.target.matches(class.name) {
            continue;
        }
        let proxies = shim
            .proxies
            .iter()
            .map(|proxy| {
                let target = find_target(class, proxy);
                if target.is_none() {
                    composition.conflicts.push(
                        Conflict::ShimTargetMissing {
                            class: class.name.to_string(),
                            interface: shim.interface.clone(),
                            method: proxy.method.clone(),
                            target: proxy.target.clone(),
                        }
                        .report(),
                    );
                }
                ProxyBinding {
                    method: proxy.method.clone(),
                    target,
                }
            })
            .collect();
        composition.shims.push(ShimAttachment {
            interface: shim.interface.clone(),
            proxies,
        });
    }
}

/// Declared methods first, then the super-class line nearest first.
fn find_target(class: &ClassView<'_>, proxy: &ShimProxy) -> Option<ProxyTarget> {
    let wanted = |method: &AnalyzedMethod| {
        !method.is_malformed()
            && method.name() == proxy.target
            && proxy
                .descriptor
                .as_deref()
                .is_none_or(|descriptor| descriptor == method.descriptor())
    };
    let declared = class
        .methods
        .iter()
        .find(|method| wanted(*method))
        .map(|method| (class.name, method));
    let inherited = || {
        class.super_chain.iter().find_map(|ancestor| {
            ancestor
                .methods()
                .iter()
                .find(|method| !method.access().is_private && wanted(*method))
                .map(|method| (ancestor.name(), method))
        })
    };
    declared.or_else(inherited).map(|(declared_in, method)| ProxyTarget {
        name: method.name().to_string(),
        descriptor: method.descriptor().to_string(),
        declared_in: declared_in.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_rules;
    use crate::hierarchy::{HierarchyAnalyzer, LoaderId};
    use crate::registry::AdviceRegistry;
    use crate::test_support::{MapSource, class, method};

    const RULES: &str = r#"{
        "mixins": [
            { "id": "trace", "targets": ["app.*Servlet"], "interfaces": ["agent.HasTrace"],
              "init": "agent$init", "implementation": "agent.TraceMixin" },
            { "id": "clash", "targets": ["app.HomeServlet"], "interfaces": ["agent.HasTrace"] },
            { "id": "closeable", "targets": ["app.HomeServlet"], "interfaces": ["java.io.Closeable"] }
        ],
        "shims": [
            { "interface": "agent.RequestShim", "target": "app.HomeServlet",
              "proxies": [
                  { "method": "agent$path", "target": "getPath" },
                  { "method": "agent$query", "target": "getQuery" }
              ] }
        ]
    }"#;

    fn analyzer(classes: Vec<crate::ir::RawClass>) -> HierarchyAnalyzer<MapSource> {
        let rules = parse_rules(RULES).expect("parse rules");
        let registry = Arc::new(AdviceRegistry::new(Snapshot::compile(rules)));
        HierarchyAnalyzer::new(MapSource::new(classes), registry)
    }

    #[test]
    fn colliding_and_already_implemented_interfaces_are_reported() {
        let analyzer = analyzer(vec![class("java.io.Closeable", None, &[], vec![])]);

        let home = analyzer.analyze(
            &LoaderId::new("app"),
            &class(
                "app.HomeServlet",
                None,
                &["java.io.Closeable"],
                vec![method("getPath", "()Ljava/lang/String;")],
            ),
        );

        let attached: Vec<&str> = home.mixins().iter().map(|mixin| mixin.id.as_str()).collect();
        assert_eq!(attached, vec!["trace"]);
        let rules: Vec<&str> = home.conflicts().iter().map(|c| c.rule_id()).collect();
        assert_eq!(
            rules,
            vec![
                "mixin-interface-collision",
                "mixin-interface-collision",
                "shim-target-missing"
            ]
        );
    }

    #[test]
    fn mixin_attached_to_superclass_is_inherited_not_repeated() {
        let analyzer = analyzer(vec![class("app.BaseServlet", None, &[], vec![])]);

        let child = analyzer.analyze(
            &LoaderId::new("app"),
            &class("app.ChildServlet", Some("app.BaseServlet"), &[], vec![]),
        );
        let base = analyzer
            .resolve(&LoaderId::new("app"), "app.BaseServlet")
            .expect("base");

        assert_eq!(base.mixins().len(), 1);
        assert!(child.mixins().is_empty());
        assert!(child.conflicts().is_empty());
    }

    #[test]
    fn shim_proxies_resolve_through_superclass() {
        let analyzer = analyzer(vec![class(
            "app.Base",
            None,
            &[],
            vec![method("getQuery", "()Ljava/lang/String;")],
        )]);

        let home = analyzer.analyze(
            &LoaderId::new("app"),
            &class(
                "app.HomeServlet",
                Some("app.Base"),
                &[],
                vec![method("getPath", "()Ljava/lang/String;")],
            ),
        );

        let shim = &home.shims()[0];
        assert_eq!(shim.interface, "agent.RequestShim");
        let declared_in: Vec<Option<&str>> = shim
            .proxies
            .iter()
            .map(|proxy| proxy.target.as_ref().map(|target| target.declared_in.as_str()))
            .collect();
        assert_eq!(declared_in, vec![Some("app.HomeServlet"), Some("app.Base")]);
    }

    #[test]
    fn interfaces_receive_no_composition() {
        let analyzer = analyzer(Vec::new());
        let mut servlet = class("app.GenericServlet", None, &[], vec![]);
        servlet.access.is_interface = true;

        let analyzed = analyzer.analyze(&LoaderId::new("app"), &servlet);

        assert!(analyzed.mixins().is_empty());
        assert!(analyzed.shims().is_empty());
    }
}
