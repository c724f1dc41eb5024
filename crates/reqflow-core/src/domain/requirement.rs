//! Request-side vocabulary: `Requirement`, `Understanding`, `Complexity`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::error::Result;

/// An incoming analysis request. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub raw_text: String,
    /// Free-form caller context. Ordered so the digest is stable.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Component ids the caller would like consulted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred_components: Vec<String>,
}

impl Requirement {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            context: BTreeMap::new(),
            preferred_components: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: BTreeMap<String, String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_preferred(mut self, ids: Vec<String>) -> Self {
        self.preferred_components = ids;
        self
    }

    /// Copy of this requirement with the text narrowed to `focus`.
    ///
    /// The original text is kept in context under `original_text`.
    pub fn focused_on(&self, focus: &str) -> Self {
        let mut context = self.context.clone();
        context.insert("original_text".to_string(), self.raw_text.clone());
        Self {
            raw_text: focus.to_string(),
            context,
            preferred_components: self.preferred_components.clone(),
        }
    }

    /// SHA-256 hex digest of the canonical JSON encoding.
    pub fn digest(&self) -> Result<String> {
        use sha2::Digest as _;
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(sha2::Sha256::digest(&bytes)))
    }
}

/// Coarse effort estimate for a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        };
        write!(f, "{s}")
    }
}

/// Structured interpretation of a [`Requirement`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Understanding {
    pub domain_hints: BTreeSet<String>,
    /// Always non-empty.
    pub key_questions: Vec<String>,
    pub complexity: Complexity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred_components: Vec<String>,
    /// `true` when produced by the local recovery path.
    #[serde(default)]
    pub degraded: bool,
}

impl Understanding {
    /// The recovery understanding used when interpretation fails.
    pub fn degraded(requirement: &Requirement) -> Self {
        Self {
            domain_hints: BTreeSet::from(["generic".to_string()]),
            key_questions: vec![requirement.raw_text.clone()],
            complexity: Complexity::Low,
            preferred_components: requirement.preferred_components.clone(),
            degraded: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_for_identical_requirements() {
        let ctx = BTreeMap::from([("team".to_string(), "ops".to_string())]);
        let a = Requirement::new("assess rollout risk").with_context(ctx.clone());
        let b = Requirement::new("assess rollout risk").with_context(ctx);
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_eq!(a.digest().unwrap().len(), 64);
    }

    #[test]
    fn test_digest_changes_with_text() {
        let a = Requirement::new("one");
        let b = Requirement::new("two");
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
    }

    #[test]
    fn test_degraded_understanding_shape() {
        let req = Requirement::new("what now?");
        let u = Understanding::degraded(&req);
        assert!(u.degraded);
        assert_eq!(u.complexity, Complexity::Low);
        assert_eq!(u.key_questions, vec!["what now?".to_string()]);
        assert!(u.domain_hints.contains("generic"));
        assert_eq!(u.domain_hints.len(), 1);
    }

    #[test]
    fn test_focused_keeps_original_text_in_context() {
        let req = Requirement::new("full text");
        let focused = req.focused_on("weak part?");
        assert_eq!(focused.raw_text, "weak part?");
        assert_eq!(
            focused.context.get("original_text").map(String::as_str),
            Some("full text")
        );
    }
}
