//! Method name matching.
//!
//! # Responsibilities
//! - Match a JSON-RPC method name exactly (case-sensitive)
//! - Match a method name against a regular expression
//! - Match through an arbitrary predicate supplied by code
//!
//! # Design Decisions
//! - One tagged enum, dispatched by `match`; no trait objects for the common cases
//! - Matchers compare equal by their textual representation
//!   (`exact:<name>`, `regex:<pattern>`, `predicate:<name>`)
//! - Regex search semantics (unanchored) unless the pattern anchors itself

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::chaos::error::{ConfigResult, ConfigurationError};

/// Predicate over a method name.
pub type MethodPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Selects which rule applies to a method name.
#[derive(Clone)]
pub enum MethodMatcher {
    /// Exact, case-sensitive method name.
    Exact(String),
    /// Compiled regular expression.
    Pattern(Regex),
    /// Arbitrary predicate. `name` identifies it for equality and display.
    Predicate { name: String, test: MethodPredicate },
}

impl MethodMatcher {
    pub fn exact(method: impl Into<String>) -> Self {
        MethodMatcher::Exact(method.into())
    }

    /// Compile a regular expression matcher.
    pub fn pattern(pattern: &str) -> ConfigResult<Self> {
        Regex::new(pattern)
            .map(MethodMatcher::Pattern)
            .map_err(|e| ConfigurationError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn predicate<F>(name: impl Into<String>, test: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        MethodMatcher::Predicate {
            name: name.into(),
            test: Arc::new(test),
        }
    }

    /// Returns true if `method` is selected by this matcher.
    pub fn matches(&self, method: &str) -> bool {
        match self {
            MethodMatcher::Exact(expected) => expected == method,
            MethodMatcher::Pattern(re) => re.is_match(method),
            MethodMatcher::Predicate { test, .. } => test(method),
        }
    }

    /// Stable textual form used for equality, logs and snapshots.
    pub fn representation(&self) -> String {
        match self {
            MethodMatcher::Exact(method) => format!("exact:{}", method),
            MethodMatcher::Pattern(re) => format!("regex:{}", re.as_str()),
            MethodMatcher::Predicate { name, .. } => format!("predicate:{}", name),
        }
    }
}

impl PartialEq for MethodMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.representation() == other.representation()
    }
}

impl fmt::Debug for MethodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MethodMatcher")
            .field(&self.representation())
            .finish()
    }
}

impl fmt::Display for MethodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.representation())
    }
}

impl From<&str> for MethodMatcher {
    fn from(method: &str) -> Self {
        MethodMatcher::exact(method)
    }
}

impl From<String> for MethodMatcher {
    fn from(method: String) -> Self {
        MethodMatcher::Exact(method)
    }
}

/// Serializable matcher description used by config files and the admin API.
/// Exactly one of `method` and `pattern` must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatcherSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl MatcherSpec {
    pub fn method(method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            pattern: None,
        }
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self {
            method: None,
            pattern: Some(pattern.into()),
        }
    }

    pub fn compile(&self) -> ConfigResult<MethodMatcher> {
        match (&self.method, &self.pattern) {
            (Some(method), None) => Ok(MethodMatcher::exact(method.clone())),
            (None, Some(pattern)) => MethodMatcher::pattern(pattern),
            (Some(_), Some(_)) => Err(ConfigurationError::InvalidMatcher(
                "set either 'method' or 'pattern', not both".to_string(),
            )),
            (None, None) => Err(ConfigurationError::InvalidMatcher(
                "one of 'method' or 'pattern' is required".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_matcher() {
        let matcher = MethodMatcher::exact("eth_call");
        assert!(matcher.matches("eth_call"));
        assert!(!matcher.matches("eth_callMany"));
        assert!(!matcher.matches("ETH_CALL")); // Case sensitive
    }

    #[test]
    fn test_pattern_matcher() {
        let matcher = MethodMatcher::pattern("^eth_get").unwrap();
        assert!(matcher.matches("eth_getBalance"));
        assert!(matcher.matches("eth_getLogs"));
        assert!(!matcher.matches("net_version"));

        let unanchored = MethodMatcher::pattern("Balance").unwrap();
        assert!(unanchored.matches("eth_getBalance"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = MethodMatcher::pattern("eth_(").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidPattern { .. }));
    }

    #[test]
    fn test_predicate_matcher() {
        let matcher = MethodMatcher::predicate("short", |m| m.len() < 8);
        assert!(matcher.matches("net_ver"));
        assert!(!matcher.matches("eth_blockNumber"));
    }

    #[test]
    fn test_equality_by_representation() {
        assert_eq!(MethodMatcher::exact("a"), MethodMatcher::from("a"));
        assert_ne!(MethodMatcher::exact("a"), MethodMatcher::pattern("a").unwrap());
        assert_eq!(
            MethodMatcher::pattern("^a").unwrap(),
            MethodMatcher::pattern("^a").unwrap()
        );
        assert_eq!(
            MethodMatcher::predicate("p", |_| true),
            MethodMatcher::predicate("p", |_| false)
        );
    }

    #[test]
    fn test_spec_compile() {
        assert_eq!(
            MatcherSpec::method("eth_call").compile().unwrap(),
            MethodMatcher::exact("eth_call")
        );
        assert!(MatcherSpec::pattern("^eth_").compile().unwrap().matches("eth_call"));
        assert!(MatcherSpec::default().compile().is_err());

        let both = MatcherSpec {
            method: Some("a".into()),
            pattern: Some("b".into()),
        };
        assert!(matches!(
            both.compile(),
            Err(ConfigurationError::InvalidMatcher(_))
        ));
    }
}
