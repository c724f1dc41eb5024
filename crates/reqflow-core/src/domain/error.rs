//! Error taxonomy for reqflow.
//!
//! Construction and configuration problems surface as [`ReqflowError`].
//! Failures raised by individual analysis components surface as
//! [`ComponentError`] and never leave the pipeline: the coordinator
//! classifies them into a [`FailureClass`](super::degradation::FailureClass)
//! and hands them to the degradation policy.

/// Errors raised while building registries, loading config or validating input.
#[derive(Debug, thiserror::Error)]
pub enum ReqflowError {
    #[error("invalid requirement: {0}")]
    InvalidRequirement(String),

    #[error("invalid component descriptor {id}: {reason}")]
    InvalidDescriptor { id: String, reason: String },

    #[error("component registered twice: {0}")]
    DuplicateComponent(String),

    #[error("unknown component: {0}")]
    UnknownComponent(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("toml parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for reqflow construction and configuration operations.
pub type Result<T> = std::result::Result<T, ReqflowError>;

/// Errors produced by an [`AnalysisComponent`](super::component::AnalysisComponent) call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ComponentError {
    #[error("component {component} failed: {reason}")]
    Failed { component: String, reason: String },

    #[error("component {component} could not be started: {reason}")]
    Spawn { component: String, reason: String },

    #[error("component {component} returned invalid output: {reason}")]
    InvalidOutput { component: String, reason: String },
}

impl ComponentError {
    pub fn failed(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            component: component.into(),
            reason: reason.into(),
        }
    }
}
