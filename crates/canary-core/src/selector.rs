//! Label selector parsing and matching.
//!
//! Supports the equality-based selector grammar: a comma-separated list
//! of `key=value`, `key==value`, `key!=value`, `key` (exists) and `!key`
//! (does not exist). All requirements must hold for a match.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*/)?[A-Za-z0-9]([-A-Za-z0-9_.]{0,61}[A-Za-z0-9])?$",
    )
    .expect("label key pattern is valid")
});

static VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9]([-A-Za-z0-9_.]{0,61}[A-Za-z0-9])?)?$")
        .expect("label value pattern is valid")
});

/// Errors produced while parsing a selector string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("selector is empty")]
    Empty,

    #[error("empty requirement in selector: {0:?}")]
    EmptyTerm(String),

    #[error("invalid label key: {0:?}")]
    InvalidKey(String),

    #[error("invalid label value {value:?} for key {key:?}")]
    InvalidValue { key: String, value: String },
}

/// A single label requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Equals { key: String, value: String },
    NotEquals { key: String, value: String },
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Equals { key, value } => labels.get(key) == Some(value),
            // Absent keys satisfy an inequality.
            Self::NotEquals { key, value } => labels.get(key) != Some(value),
            Self::Exists(key) => labels.contains_key(key),
            Self::DoesNotExist(key) => !labels.contains_key(key),
        }
    }

    fn parse(term: &str) -> Result<Self, SelectorError> {
        let req = if let Some((k, v)) = term.split_once("!=") {
            Self::NotEquals {
                key: k.trim().to_string(),
                value: v.trim().to_string(),
            }
        } else if let Some((k, v)) = term.split_once("==").or_else(|| term.split_once('=')) {
            Self::Equals {
                key: k.trim().to_string(),
                value: v.trim().to_string(),
            }
        } else if let Some(k) = term.strip_prefix('!') {
            Self::DoesNotExist(k.trim().to_string())
        } else {
            Self::Exists(term.to_string())
        };
        req.validate()?;
        Ok(req)
    }

    fn validate(&self) -> Result<(), SelectorError> {
        let (key, value) = match self {
            Self::Equals { key, value } | Self::NotEquals { key, value } => (key, Some(value)),
            Self::Exists(key) | Self::DoesNotExist(key) => (key, None),
        };
        if !KEY_RE.is_match(key) {
            return Err(SelectorError::InvalidKey(key.clone()));
        }
        if let Some(value) = value
            && !VALUE_RE.is_match(value)
        {
            return Err(SelectorError::InvalidValue {
                key: key.clone(),
                value: value.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals { key, value } => write!(f, "{key}={value}"),
            Self::NotEquals { key, value } => write!(f, "{key}!={value}"),
            Self::Exists(key) => write!(f, "{key}"),
            Self::DoesNotExist(key) => write!(f, "!{key}"),
        }
    }
}

/// A conjunction of label requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Parse a selector string. Empty selectors are rejected: a selector
    /// that matches everything would put every workload in the namespace
    /// under rollout.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SelectorError::Empty);
        }
        let mut requirements = Vec::new();
        for term in input.split(',') {
            let term = term.trim();
            if term.is_empty() {
                return Err(SelectorError::EmptyTerm(input.to_string()));
            }
            requirements.push(Requirement::parse(term)?);
        }
        Ok(Self { requirements })
    }

    /// Return a new selector with an additional `key=value` requirement.
    pub fn and_equals(&self, key: &str, value: &str) -> Self {
        let mut requirements = self.requirements.clone();
        requirements.push(Requirement::Equals {
            key: key.to_string(),
            value: value.to_string(),
        });
        Self { requirements }
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }
}

impl FromStr for LabelSelector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, req) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{req}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_equality_forms() {
        let sel = LabelSelector::parse("app=web, tier==frontend").unwrap();
        assert_eq!(sel.requirements().len(), 2);
        assert!(sel.matches(&labels(&[("app", "web"), ("tier", "frontend")])));
        assert!(!sel.matches(&labels(&[("app", "web")])));
    }

    #[test]
    fn inequality_matches_absent_key() {
        let sel = LabelSelector::parse("app=web,role!=auto-canary").unwrap();
        assert!(sel.matches(&labels(&[("app", "web")])));
        assert!(!sel.matches(&labels(&[("app", "web"), ("role", "auto-canary")])));
        assert!(sel.matches(&labels(&[("app", "web"), ("role", "primary")])));
    }

    #[test]
    fn existence_requirements() {
        let sel = LabelSelector::parse("app,!legacy").unwrap();
        assert!(sel.matches(&labels(&[("app", "anything")])));
        assert!(!sel.matches(&labels(&[("app", "x"), ("legacy", "true")])));
        assert!(!sel.matches(&labels(&[])));
    }

    #[test]
    fn and_equals_narrows() {
        let sel = LabelSelector::parse("app=web").unwrap();
        let canary = sel.and_equals("role", "auto-canary");
        assert!(sel.matches(&labels(&[("app", "web")])));
        assert!(!canary.matches(&labels(&[("app", "web")])));
        assert!(canary.matches(&labels(&[("app", "web"), ("role", "auto-canary")])));
        assert_eq!(canary.to_string(), "app=web,role=auto-canary");
    }

    #[test]
    fn prefixed_keys_are_valid() {
        let sel = LabelSelector::parse("app.kubernetes.io/name=web").unwrap();
        assert!(sel.matches(&labels(&[("app.kubernetes.io/name", "web")])));
    }

    #[test]
    fn rejects_malformed_selectors() {
        assert_eq!(LabelSelector::parse("   "), Err(SelectorError::Empty));
        assert!(matches!(
            LabelSelector::parse("app=web,,tier=x"),
            Err(SelectorError::EmptyTerm(_))
        ));
        assert!(matches!(
            LabelSelector::parse("=web"),
            Err(SelectorError::InvalidKey(_))
        ));
        assert!(matches!(
            LabelSelector::parse("app=web server"),
            Err(SelectorError::InvalidValue { .. })
        ));
        assert!(matches!(
            LabelSelector::parse("a b=c"),
            Err(SelectorError::InvalidKey(_))
        ));
    }

    #[test]
    fn empty_value_is_allowed() {
        let sel = LabelSelector::parse("app=").unwrap();
        assert!(sel.matches(&labels(&[("app", "")])));
    }

    #[test]
    fn display_round_trips_through_parse() {
        let input = "app=web,tier!=cache,team,!legacy";
        let sel: LabelSelector = input.parse().unwrap();
        assert_eq!(sel.to_string(), input);
    }
}
