use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pattern::{NamePattern, PatternError};

/// Declarative match rule for one advice.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PointcutSpec {
    pub class_name: Option<NamePattern>,
    pub class_annotation: Option<NamePattern>,
    pub sub_type_restriction: Option<NamePattern>,
    pub super_type_restriction: Option<NamePattern>,
    pub method_name: Option<NamePattern>,
    pub method_annotation: Option<NamePattern>,
    pub method_parameter_types: Vec<ParameterTypeMatcher>,
    pub method_return_type: Option<NamePattern>,
    pub method_modifiers: Vec<MethodModifier>,
    pub order: i32,
    pub timer_name: String,
    pub reweavable: bool,
}

/// Positional matcher for one method parameter type.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum ParameterTypeMatcher {
    Type(NamePattern),
    /// `..`: zero or more remaining parameters.
    Remaining,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodModifier {
    Public,
    Static,
    NotStatic,
}

/// Method facts a pointcut is tested against.
pub struct MethodFacts<'a> {
    pub name: &'a str,
    pub parameter_types: &'a [String],
    pub return_type: &'a str,
    pub annotations: &'a [String],
    pub is_public: bool,
    pub is_static: bool,
}

impl PointcutSpec {
    /// Method-level criteria: name, annotation, parameters, return type and modifiers.
    pub fn matches_method(&self, method: &MethodFacts<'_>) -> bool {
        if let Some(pattern) = &self.method_name {
            let special = method.name.starts_with('<');
            if special && !pattern.is_literal() {
                return false;
            }
            if !pattern.matches(method.name) {
                return false;
            }
        }
        if let Some(pattern) = &self.method_annotation {
            if !pattern.matches_any(method.annotations.iter().map(String::as_str)) {
                return false;
            }
        }
        if !parameters_match(&self.method_parameter_types, method.parameter_types) {
            return false;
        }
        if let Some(pattern) = &self.method_return_type {
            if !pattern.matches(method.return_type) {
                return false;
            }
        }
        self.method_modifiers.iter().all(|modifier| match modifier {
            MethodModifier::Public => method.is_public,
            MethodModifier::Static => method.is_static,
            MethodModifier::NotStatic => !method.is_static,
        })
    }

    /// Class-level criteria over a class and its ancestors, sub-type restriction excluded.
    pub fn matches_class(&self, type_names: &[&str], annotations: &[&str]) -> bool {
        if let Some(pattern) = &self.class_name {
            if !pattern.matches_any(type_names.iter().copied()) {
                return false;
            }
        }
        if let Some(pattern) = &self.class_annotation {
            if !pattern.matches_any(annotations.iter().copied()) {
                return false;
            }
        }
        match &self.super_type_restriction {
            Some(pattern) => pattern.matches_any(type_names.iter().copied()),
            None => true,
        }
    }

    pub fn sub_type_satisfied(&self, type_names: &[&str]) -> bool {
        match &self.sub_type_restriction {
            Some(pattern) => pattern.matches_any(type_names.iter().copied()),
            None => true,
        }
    }

    /// Structural problems that make the pointcut unusable, if any.
    pub fn problem(&self) -> Option<&'static str> {
        if self.class_name.is_none() && self.class_annotation.is_none() {
            return Some("pointcut names neither a class nor a class annotation");
        }
        if self.method_name.is_none() && self.method_annotation.is_none() {
            return Some("pointcut names neither a method nor a method annotation");
        }
        let last = self.method_parameter_types.len().saturating_sub(1);
        let misplaced = self
            .method_parameter_types
            .iter()
            .enumerate()
            .any(|(index, matcher)| *matcher == ParameterTypeMatcher::Remaining && index != last);
        if misplaced {
            return Some("`..` must be the last parameter type");
        }
        None
    }
}

fn parameters_match(matchers: &[ParameterTypeMatcher], types: &[String]) -> bool {
    let mut types = types.iter();
    for matcher in matchers {
        match matcher {
            ParameterTypeMatcher::Remaining => return true,
            ParameterTypeMatcher::Type(pattern) => match types.next() {
                Some(actual) if pattern.matches(actual) => {}
                _ => return false,
            },
        }
    }
    types.next().is_none()
}

impl TryFrom<String> for ParameterTypeMatcher {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == ".." {
            Ok(Self::Remaining)
        } else {
            NamePattern::parse(&value).map(Self::Type)
        }
    }
}

impl From<ParameterTypeMatcher> for String {
    fn from(matcher: ParameterTypeMatcher) -> Self {
        matcher.to_string()
    }
}

impl fmt::Display for ParameterTypeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(pattern) => write!(f, "{pattern}"),
            Self::Remaining => f.write_str(".."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(text: &str) -> NamePattern {
        NamePattern::parse(text).expect("pattern")
    }

    fn matcher(text: &str) -> ParameterTypeMatcher {
        ParameterTypeMatcher::try_from(text.to_string()).expect("matcher")
    }

    fn facts<'a>(name: &'a str, parameter_types: &'a [String]) -> MethodFacts<'a> {
        MethodFacts {
            name,
            parameter_types,
            return_type: "void",
            annotations: &[],
            is_public: true,
            is_static: false,
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parameter_types_match_by_position_and_count() {
        let spec = PointcutSpec {
            method_name: Some(pattern("execute")),
            method_parameter_types: vec![matcher("java.lang.String"), matcher("int")],
            ..PointcutSpec::default()
        };

        let exact = strings(&["java.lang.String", "int"]);
        let longer = strings(&["java.lang.String", "int", "long"]);
        let swapped = strings(&["int", "java.lang.String"]);
        assert!(spec.matches_method(&facts("execute", &exact)));
        assert!(!spec.matches_method(&facts("execute", &longer)));
        assert!(!spec.matches_method(&facts("execute", &swapped)));
    }

    #[test]
    fn trailing_remaining_matcher_accepts_any_tail() {
        let spec = PointcutSpec {
            method_name: Some(pattern("execute")),
            method_parameter_types: vec![matcher("java.lang.String"), matcher("..")],
            ..PointcutSpec::default()
        };

        assert!(spec.matches_method(&facts("execute", &strings(&["java.lang.String"]))));
        assert!(spec.matches_method(&facts(
            "execute",
            &strings(&["java.lang.String", "int", "java.lang.Object[]"])
        )));
        assert!(!spec.matches_method(&facts("execute", &[])));
    }

    #[test]
    fn empty_parameter_list_means_no_arguments() {
        let spec = PointcutSpec {
            method_name: Some(pattern("run")),
            ..PointcutSpec::default()
        };

        assert!(spec.matches_method(&facts("run", &[])));
        assert!(!spec.matches_method(&facts("run", &strings(&["int"]))));
    }

    #[test]
    fn wildcard_names_skip_constructors() {
        let wildcard = PointcutSpec {
            method_name: Some(pattern("*")),
            ..PointcutSpec::default()
        };
        let literal = PointcutSpec {
            method_name: Some(pattern("<init>")),
            ..PointcutSpec::default()
        };

        assert!(!wildcard.matches_method(&facts("<init>", &[])));
        assert!(wildcard.matches_method(&facts("close", &[])));
        assert!(literal.matches_method(&facts("<init>", &[])));
    }

    #[test]
    fn modifiers_must_all_hold() {
        let spec = PointcutSpec {
            method_name: Some(pattern("run")),
            method_modifiers: vec![MethodModifier::Public, MethodModifier::NotStatic],
            ..PointcutSpec::default()
        };
        let mut method = facts("run", &[]);
        assert!(spec.matches_method(&method));

        method.is_static = true;
        assert!(!spec.matches_method(&method));
    }

    #[test]
    fn super_type_restriction_checks_the_hierarchy() {
        let spec = PointcutSpec {
            class_name: Some(pattern("*")),
            super_type_restriction: Some(pattern("javax.servlet.Servlet")),
            ..PointcutSpec::default()
        };

        assert!(spec.matches_class(&["app.Home", "javax.servlet.Servlet"], &[]));
        assert!(!spec.matches_class(&["app.Home", "java.lang.Object"], &[]));
    }

    #[test]
    fn reports_incomplete_pointcuts() {
        let no_class = PointcutSpec {
            method_name: Some(pattern("run")),
            ..PointcutSpec::default()
        };
        let misplaced = PointcutSpec {
            class_name: Some(pattern("A")),
            method_name: Some(pattern("run")),
            method_parameter_types: vec![matcher(".."), matcher("int")],
            ..PointcutSpec::default()
        };

        assert!(no_class.problem().is_some());
        assert!(misplaced.problem().is_some());
    }

    #[test]
    fn deserializes_camel_case_rule() {
        let spec: PointcutSpec = serde_json::from_str(
            r#"{
                "className": "java.sql.Statement",
                "methodName": "execute*",
                "methodParameterTypes": ["java.lang.String", ".."],
                "methodModifiers": ["not_static"],
                "order": 5,
                "timerName": "jdbc execute"
            }"#,
        )
        .expect("deserialize pointcut");

        assert_eq!(spec.order, 5);
        assert_eq!(spec.timer_name, "jdbc execute");
        assert_eq!(
            spec.method_parameter_types.last(),
            Some(&ParameterTypeMatcher::Remaining)
        );
        assert!(!spec.reweavable);
    }
}
