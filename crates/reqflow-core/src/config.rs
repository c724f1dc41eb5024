//! Pipeline and registry configuration.
//!
//! A config file is TOML unless its extension is `.json`. Every pipeline
//! knob has a default, so an empty file yields a usable (fallback-only)
//! setup.
//!
//! ```toml
//! fallback_component = "generic"
//!
//! [pipeline]
//! max_components = 3
//! global_deadline_ms = 20000
//!
//! [lexicon]
//! finance = ["budget", "revenue", "cost"]
//!
//! [taxonomy]
//! compliance = "risks"
//!
//! [[components]]
//! id = "finance"
//! capability_tags = ["finance"]
//! priority = 5
//! timeout_ms = 2000
//! trust_weight = 0.6
//! kind = "command"
//! command = ["./bin/finance-analyzer"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::components::{CommandComponent, FixedComponent};
use crate::domain::{
    AnalysisComponent, ComponentDescriptor, ReqflowError, Result, SectionKind,
};
use crate::registry::ComponentRegistry;

/// Orchestration knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on components selected per plan.
    pub max_components: usize,
    /// Upper bound on concurrent component calls.
    pub max_concurrency: usize,
    /// Deadline for the whole execution stage.
    pub global_deadline_ms: u64,
    /// Sub-deadline for the single validator-triggered re-run.
    pub validator_retry_deadline_ms: u64,
    /// Aggregate confidence the validator requires.
    pub min_confidence: f64,
    /// Token-set similarity at or above which two sections are duplicates.
    pub similarity_threshold: f64,
    /// Confidence given to synthesized generic-fallback results.
    pub generic_fallback_confidence: f64,
    /// Total component retries allowed per request.
    pub retry_budget: u32,
    /// Retries allowed for any single component slot.
    pub per_component_retries: u32,
    /// When false, unrecoverable slots end `Failed` instead of synthesized.
    pub allow_generic_fallback: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_components: 5,
            max_concurrency: 4,
            global_deadline_ms: 30_000,
            validator_retry_deadline_ms: 10_000,
            min_confidence: 0.5,
            similarity_threshold: 0.85,
            generic_fallback_confidence: 0.3,
            retry_budget: 2,
            per_component_retries: 1,
            allow_generic_fallback: true,
        }
    }
}

impl PipelineConfig {
    pub fn global_deadline(&self) -> Duration {
        Duration::from_millis(self.global_deadline_ms)
    }

    pub fn validator_retry_deadline(&self) -> Duration {
        Duration::from_millis(self.validator_retry_deadline_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_components == 0 {
            return Err(ReqflowError::Config("max_components must be at least 1".into()));
        }
        if self.max_concurrency == 0 {
            return Err(ReqflowError::Config("max_concurrency must be at least 1".into()));
        }
        if self.global_deadline_ms == 0 {
            return Err(ReqflowError::Config("global_deadline_ms must be positive".into()));
        }
        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("similarity_threshold", self.similarity_threshold),
            ("generic_fallback_confidence", self.generic_fallback_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ReqflowError::Config(format!("{name} {value} outside 0..1")));
            }
        }
        Ok(())
    }
}

/// How a configured component is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Fixed,
    Command,
}

/// One `[[components]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub id: String,
    pub capability_tags: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    pub timeout_ms: u64,
    #[serde(default = "default_trust_weight")]
    pub trust_weight: f64,
    pub kind: ComponentKind,
    /// `fixed` only.
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    /// `fixed` only.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// `command` only.
    #[serde(default)]
    pub command: Vec<String>,
}

fn default_trust_weight() -> f64 {
    0.5
}

impl ComponentSpec {
    pub fn descriptor(&self) -> ComponentDescriptor {
        ComponentDescriptor {
            id: self.id.clone(),
            capability_tags: self.capability_tags.iter().cloned().collect(),
            priority: self.priority,
            timeout_ms: self.timeout_ms,
            trust_weight: self.trust_weight,
        }
    }

    fn instantiate(&self) -> Result<Arc<dyn AnalysisComponent>> {
        let invalid = |reason: &str| ReqflowError::InvalidDescriptor {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        match self.kind {
            ComponentKind::Fixed => {
                let payload = self
                    .payload
                    .clone()
                    .ok_or_else(|| invalid("fixed component requires `payload`"))?;
                let confidence = self
                    .confidence
                    .ok_or_else(|| invalid("fixed component requires `confidence`"))?;
                Ok(Arc::new(FixedComponent::new(payload, confidence)))
            }
            ComponentKind::Command => {
                if self.command.is_empty() {
                    return Err(invalid("command component requires a non-empty `command`"));
                }
                Ok(Arc::new(CommandComponent::new(
                    self.id.clone(),
                    self.command.clone(),
                )))
            }
        }
    }
}

/// Top-level config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReqflowConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Capability tag -> extra keywords that imply it.
    #[serde(default)]
    pub lexicon: BTreeMap<String, Vec<String>>,
    /// Capability tag -> report section it feeds.
    #[serde(default)]
    pub taxonomy: BTreeMap<String, SectionKind>,
    #[serde(default)]
    pub fallback_component: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
}

impl ReqflowConfig {
    /// Load from disk; `.json` files are parsed as JSON, anything else as TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let config = if is_json {
            Self::from_json_str(&raw)?
        } else {
            Self::from_toml_str(&raw)?
        };
        tracing::debug!(path = %path.display(), components = config.components.len(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.pipeline.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Instantiate every configured component and freeze the registry.
    pub fn build_registry(&self) -> Result<ComponentRegistry> {
        let mut builder = ComponentRegistry::builder()
            .generic_confidence(self.pipeline.generic_fallback_confidence);
        for spec in &self.components {
            builder = builder.register(spec.descriptor(), spec.instantiate()?);
        }
        if let Some(fallback) = &self.fallback_component {
            builder = builder.fallback(fallback.clone());
        }
        builder.build()
    }
}
