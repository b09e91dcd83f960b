//! Message templates for trace events.
//!
//! Receiver and argument paths are captured when the method is entered,
//! because the objects they reach may change before the message is
//! formatted. The return path is captured once, when the value exists.

use std::fmt;

use serde_json::Value;

/// Live value the renderer can walk by property name.
pub trait Inspect {
    fn property(&self, name: &str) -> Option<&dyn Inspect>;

    fn display(&self) -> String;
}

impl Inspect for Value {
    fn property(&self, name: &str) -> Option<&dyn Inspect> {
        match self {
            Value::Object(map) => map.get(name).map(|value| value as &dyn Inspect),
            Value::Array(items) => name
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index))
                .map(|value| value as &dyn Inspect),
            _ => None,
        }
    }

    fn display(&self) -> String {
        match self {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Part {
    Constant(String),
    ThisPath(Vec<String>),
    ArgPath { index: usize, path: Vec<String> },
    ReturnPath(Vec<String>),
    MethodName,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unterminated placeholder at byte {offset}")]
    Unterminated { offset: usize },
    #[error("unknown placeholder {{{{{placeholder}}}}}")]
    UnknownPlaceholder { placeholder: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageTemplate {
    parts: Vec<Part>,
}

impl MessageTemplate {
    pub fn new(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut parts = Vec::new();
        let mut constant = String::new();
        let mut rest = text;
        while let Some(start) = rest.find("{{") {
            constant.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or(TemplateError::Unterminated {
                offset: text.len() - rest.len() + start,
            })?;
            if !constant.is_empty() {
                parts.push(Part::Constant(std::mem::take(&mut constant)));
            }
            parts.push(placeholder(after[..end].trim())?);
            rest = &after[end + 2..];
        }
        constant.push_str(rest);
        if !constant.is_empty() {
            parts.push(Part::Constant(constant));
        }
        Ok(Self { parts })
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Resolve every receiver and argument path against the live values.
    pub fn enter(
        &self,
        receiver: Option<&dyn Inspect>,
        args: &[&dyn Inspect],
        method_name: &str,
    ) -> PendingMessage {
        let segments = self
            .parts
            .iter()
            .map(|part| match part {
                Part::Constant(text) => Segment::Text(text.clone()),
                Part::ThisPath(path) => Segment::Text(walk(receiver, path)),
                Part::ArgPath { index, path } => Segment::Text(match args.get(*index) {
                    Some(arg) => walk(Some(*arg), path),
                    None => format!("<requested arg index out of bounds: {index}>"),
                }),
                Part::ReturnPath(path) => Segment::Return {
                    path: path.clone(),
                    value: None,
                },
                Part::MethodName => Segment::Text(method_name.to_string()),
            })
            .collect();
        PendingMessage {
            segments,
            returned: false,
        }
    }
}

fn placeholder(inner: &str) -> Result<Part, TemplateError> {
    let mut segments = inner.split('.');
    let head = segments.next().unwrap_or_default();
    let path: Vec<String> = segments.map(str::to_string).collect();
    match head {
        "this" => Ok(Part::ThisPath(path)),
        "_" => Ok(Part::ReturnPath(path)),
        "methodName" if path.is_empty() => Ok(Part::MethodName),
        _ => match head.parse::<usize>() {
            Ok(index) => Ok(Part::ArgPath { index, path }),
            Err(_) => Err(TemplateError::UnknownPlaceholder {
                placeholder: inner.to_string(),
            }),
        },
    }
}

fn walk(root: Option<&dyn Inspect>, path: &[String]) -> String {
    root.and_then(|root| path.iter().try_fold(root, |value, name| value.property(name)))
        .map_or_else(|| "null".to_string(), |value| value.display())
}

#[derive(Clone, Debug)]
enum Segment {
    Text(String),
    Return {
        path: Vec<String>,
        value: Option<String>,
    },
}

/// A template bound to one invocation.
#[derive(Clone, Debug)]
pub struct PendingMessage {
    segments: Vec<Segment>,
    returned: bool,
}

impl PendingMessage {
    /// Capture the return paths. Only the first call has any effect.
    pub fn resolve_return(&mut self, value: &dyn Inspect) -> bool {
        if self.returned {
            return false;
        }
        self.returned = true;
        for segment in &mut self.segments {
            if let Segment::Return { path, value: slot } = segment {
                *slot = Some(walk(Some(value), path));
            }
        }
        true
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PendingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => f.write_str(text)?,
                Segment::Return { value, .. } => f.write_str(value.as_deref().unwrap_or(""))?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_argument_and_out_of_bounds_placeholder() {
        let template = MessageTemplate::new(vec![
            Part::Constant("x=".to_string()),
            Part::ArgPath {
                index: 0,
                path: Vec::new(),
            },
        ]);

        let with_arg = template.enter(None, &[&json!(42)], "run");
        let without = template.enter(None, &[], "run");

        assert_eq!(with_arg.render(), "x=42");
        assert_eq!(without.render(), "x=<requested arg index out of bounds: 0>");
    }

    #[test]
    fn return_path_is_empty_until_resolved_once() {
        let template = MessageTemplate::parse("got {{_}}").expect("parse template");
        let mut pending = template.enter(None, &[], "size");

        assert_eq!(pending.render(), "got ");
        assert!(pending.resolve_return(&json!(7)));
        assert_eq!(pending.render(), "got 7");
        assert!(!pending.resolve_return(&json!(8)));
        assert_eq!(pending.render(), "got 7");
    }

    #[test]
    fn receiver_paths_are_captured_on_entry() {
        let template =
            MessageTemplate::parse("{{methodName}} {{this.user.name}} {{1.id}} {{this.missing.x}}")
                .expect("parse template");
        let mut receiver = json!({ "user": { "name": "ann" } });
        let order = json!({ "id": 17 });

        let pending = template.enter(Some(&receiver), &[&json!("ignored"), &order], "submit");
        receiver["user"]["name"] = json!("bob");

        assert_eq!(pending.render(), "submit ann 17 null");
    }

    #[test]
    fn parse_splits_constants_and_placeholders() {
        let template = MessageTemplate::parse("a {{0.b.c}} d {{_.e}}").expect("parse template");

        assert_eq!(
            template.parts(),
            &[
                Part::Constant("a ".to_string()),
                Part::ArgPath {
                    index: 0,
                    path: vec!["b".to_string(), "c".to_string()]
                },
                Part::Constant(" d ".to_string()),
                Part::ReturnPath(vec!["e".to_string()]),
            ]
        );
    }

    #[test]
    fn rejects_unterminated_and_unknown_placeholders() {
        assert_eq!(
            MessageTemplate::parse("x {{this.a"),
            Err(TemplateError::Unterminated { offset: 2 })
        );
        assert_eq!(
            MessageTemplate::parse("{{self}}"),
            Err(TemplateError::UnknownPlaceholder {
                placeholder: "self".to_string()
            })
        );
    }
}
