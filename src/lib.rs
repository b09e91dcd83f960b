//! Load-time weaving planner for JVM classes.
//!
//! Rules are compiled into an immutable [`registry::Snapshot`]. Each loaded
//! class is analyzed once by [`hierarchy::HierarchyAnalyzer`], which matches
//! advice against the class and its ancestors, and [`plan::build`] turns the
//! result into the binding plan an external code generator consumes.

pub mod advice;
pub mod binding;
pub mod classfile;
pub mod compose;
pub mod config;
pub mod conflict;
pub mod descriptor;
pub mod hierarchy;
pub mod ir;
mod matcher;
pub mod ordering;
pub mod pattern;
pub mod plan;
pub mod pointcut;
pub mod registry;
pub mod report;
pub mod scan;
pub mod template;

#[cfg(test)]
mod test_support;

pub use advice::{Advice, AdviceError, ParameterKind, Stage};
pub use config::{RuleSet, load_rules};
pub use conflict::Conflict;
pub use hierarchy::{AnalyzedClass, AnalyzedMethod, ClassKey, ClassSource, HierarchyAnalyzer, LoaderId};
pub use plan::{WeaveError, WeavingPlan};
pub use registry::{AdviceRegistry, Snapshot};
pub use template::{Inspect, MessageTemplate, PendingMessage, TemplateError};
