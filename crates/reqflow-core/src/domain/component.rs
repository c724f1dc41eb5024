//! Analysis capability contract: `ComponentDescriptor`, `ComponentOutput`,
//! `AnalysisComponent`.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::error::{ComponentError, ReqflowError, Result};
use crate::domain::requirement::Requirement;

/// Static description of a registered analysis capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub id: String,
    pub capability_tags: BTreeSet<String>,
    #[serde(default)]
    pub priority: i32,
    /// Per-call timeout budget.
    pub timeout_ms: u64,
    /// Weight of this component's confidence in aggregation, 0..1.
    #[serde(default = "default_trust_weight")]
    pub trust_weight: f64,
}

fn default_trust_weight() -> f64 {
    0.5
}

impl ComponentDescriptor {
    pub fn new<I, S>(id: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            capability_tags: tags.into_iter().map(Into::into).collect(),
            priority: 0,
            timeout_ms: 5_000,
            trust_weight: default_trust_weight(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_trust_weight(mut self, trust_weight: f64) -> Self {
        self.trust_weight = trust_weight;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Number of capability tags shared with `hints`.
    pub fn overlap(&self, hints: &BTreeSet<String>) -> usize {
        self.capability_tags.intersection(hints).count()
    }

    /// Check the descriptor invariants enforced at registration time.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| ReqflowError::InvalidDescriptor {
            id: self.id.clone(),
            reason,
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty".to_string()));
        }
        if self.capability_tags.is_empty() {
            return Err(invalid("at least one capability tag is required".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(invalid("timeout must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.trust_weight) {
            return Err(invalid(format!(
                "trust weight {} outside 0..1",
                self.trust_weight
            )));
        }
        Ok(())
    }
}

/// What a component hands back on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentOutput {
    /// Opaque structured content.
    pub payload: serde_json::Value,
    pub confidence: f64,
}

impl ComponentOutput {
    pub fn new(payload: serde_json::Value, confidence: f64) -> Self {
        Self {
            payload,
            confidence,
        }
    }

    pub fn text(content: impl Into<String>, confidence: f64) -> Self {
        Self::new(serde_json::Value::String(content.into()), confidence)
    }
}

/// An independently invokable analysis capability.
///
/// Implementations must be cancel-safe: the coordinator drops the returned
/// future when the call times out or the stage deadline passes.
#[async_trait]
pub trait AnalysisComponent: Send + Sync {
    async fn execute(
        &self,
        requirement: &Requirement,
    ) -> std::result::Result<ComponentOutput, ComponentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_overlap_counts_shared_tags() {
        let d = ComponentDescriptor::new("fin", ["finance", "budget", "ops"]);
        assert_eq!(d.overlap(&hints(&["finance", "ops", "legal"])), 2);
        assert_eq!(d.overlap(&hints(&["legal"])), 0);
    }

    #[test]
    fn test_validate_rejects_out_of_range_trust_weight() {
        let d = ComponentDescriptor::new("fin", ["finance"]).with_trust_weight(1.2);
        assert!(matches!(
            d.validate(),
            Err(ReqflowError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeout_and_missing_tags() {
        let d = ComponentDescriptor::new("fin", ["finance"]).with_timeout(Duration::ZERO);
        assert!(d.validate().is_err());

        let d = ComponentDescriptor::new("fin", Vec::<String>::new());
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_descriptor_deserializes_with_defaults() {
        let d: ComponentDescriptor = serde_json::from_str(
            r#"{"id":"ops","capability_tags":["ops"],"timeout_ms":250}"#,
        )
        .unwrap();
        assert_eq!(d.priority, 0);
        assert_eq!(d.trust_weight, 0.5);
        assert_eq!(d.timeout(), Duration::from_millis(250));
        assert!(d.validate().is_ok());
    }
}
