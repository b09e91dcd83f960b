use std::collections::HashMap;
use std::sync::Arc;

use crate::hierarchy::{ClassSource, LoaderId, LocatedClass};
use crate::ir::{RawClass, RawMethod};

/// Every class visible from every loader, defined by the requesting loader.
pub struct MapSource {
    classes: HashMap<String, Arc<RawClass>>,
}

impl MapSource {
    pub fn new(classes: Vec<RawClass>) -> Self {
        Self {
            classes: classes
                .into_iter()
                .map(|class| (class.name.clone(), Arc::new(class)))
                .collect(),
        }
    }
}

impl ClassSource for MapSource {
    fn locate(&self, loader: &LoaderId, name: &str) -> Option<LocatedClass> {
        self.classes.get(name).map(|class| LocatedClass {
            loader: loader.clone(),
            class: Arc::clone(class),
        })
    }
}

pub fn class(
    name: &str,
    super_name: Option<&str>,
    interfaces: &[&str],
    methods: Vec<RawMethod>,
) -> RawClass {
    let mut class = RawClass {
        name: name.to_string(),
        super_name: super_name.map(str::to_string),
        interfaces: interfaces.iter().map(|name| name.to_string()).collect(),
        methods,
        ..RawClass::default()
    };
    class.access.is_public = true;
    class
}

pub fn method(name: &str, descriptor: &str) -> RawMethod {
    let mut method = RawMethod {
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        ..RawMethod::default()
    };
    method.access.is_public = true;
    method
}

pub fn final_method(name: &str, descriptor: &str) -> RawMethod {
    let mut method = method(name, descriptor);
    method.access.is_final = true;
    method
}

pub fn annotated(mut method: RawMethod, annotation: &str) -> RawMethod {
    method.annotations.push(annotation.to_string());
    method
}
