use std::fmt;

use regex::Regex;

/// Error raised when a rule carries an unusable name pattern.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("empty pattern")]
    Empty,
    #[error("invalid pattern {pattern:?}: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Name pattern used by pointcuts, mixins and shims.
///
/// `/regex/` is a full-match regular expression, text containing `*` is a
/// glob, anything else is compared literally.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct NamePattern {
    source: String,
    kind: PatternKind,
}

#[derive(Clone, Debug)]
enum PatternKind {
    Literal,
    Regex(Regex),
}

impl NamePattern {
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        if text.is_empty() {
            return Err(PatternError::Empty);
        }
        let kind = if let Some(inner) = regex_body(text) {
            PatternKind::Regex(compile(text, inner)?)
        } else if text.contains('*') {
            let glob = text
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            PatternKind::Regex(compile(text, &glob)?)
        } else {
            PatternKind::Literal
        };
        Ok(Self {
            source: text.to_string(),
            kind,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        match &self.kind {
            PatternKind::Literal => self.source == name,
            PatternKind::Regex(regex) => regex.is_match(name),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, PatternKind::Literal)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True if any of `names` matches.
    pub fn matches_any<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> bool {
        names.into_iter().any(|name| self.matches(name))
    }
}

fn regex_body(text: &str) -> Option<&str> {
    if text.len() >= 2 && text.starts_with('/') && text.ends_with('/') {
        Some(&text[1..text.len() - 1])
    } else {
        None
    }
}

fn compile(pattern: &str, body: &str) -> Result<Regex, PatternError> {
    Regex::new(&format!("^(?:{body})$")).map_err(|source| PatternError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}

impl TryFrom<String> for NamePattern {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NamePattern> for String {
    fn from(pattern: NamePattern) -> Self {
        pattern.source
    }
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for NamePattern {}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_requires_exact_name() {
        let pattern = NamePattern::parse("java.util.List").expect("literal");

        assert!(pattern.is_literal());
        assert!(pattern.matches("java.util.List"));
        assert!(!pattern.matches("java.util.ListX"));
    }

    #[test]
    fn glob_escapes_dots() {
        let pattern = NamePattern::parse("com.example.*Servlet").expect("glob");

        assert!(pattern.matches("com.example.web.HttpServlet"));
        assert!(pattern.matches("com.example.Servlet"));
        assert!(!pattern.matches("comXexample.Servlet"));
        assert!(!pattern.matches("com.example.ServletConfig"));
    }

    #[test]
    fn slashes_mark_a_full_match_regex() {
        let pattern = NamePattern::parse("/get|set/").expect("regex");

        assert!(pattern.matches("get"));
        assert!(pattern.matches("set"));
        assert!(!pattern.matches("getter"));
    }

    #[test]
    fn rejects_empty_and_broken_regex() {
        assert!(matches!(NamePattern::parse(""), Err(PatternError::Empty)));
        assert!(matches!(
            NamePattern::parse("/(/"),
            Err(PatternError::Regex { .. })
        ));
    }

    #[test]
    fn deserializes_from_json_string() {
        let pattern: NamePattern = serde_json::from_str("\"*Dao\"").expect("deserialize");

        assert!(pattern.matches("UserDao"));
        assert_eq!(
            serde_json::to_string(&pattern).expect("serialize"),
            "\"*Dao\""
        );
    }
}
