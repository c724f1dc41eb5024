//! Degradation vocabulary: pipeline stages, failure classes, fallback actions
//! and the audit record appended whenever a fallback is taken.

use serde::{Deserialize, Serialize};

/// One step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Interpret,
    Select,
    Execute,
    Integrate,
    Validate,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Interpret => "interpret",
            Stage::Select => "select",
            Stage::Execute => "execute",
            Stage::Integrate => "integrate",
            Stage::Validate => "validate",
        };
        write!(f, "{s}")
    }
}

/// Failure taxonomy. Every class is recovered by the stage that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    InterpretationFailure,
    NoMatchingComponent,
    ComponentTimeout,
    ComponentError,
    DeadlineExceeded,
    IntegrationConflict,
    QualityBelowThreshold,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureClass::InterpretationFailure => "interpretation_failure",
            FailureClass::NoMatchingComponent => "no_matching_component",
            FailureClass::ComponentTimeout => "component_timeout",
            FailureClass::ComponentError => "component_error",
            FailureClass::DeadlineExceeded => "deadline_exceeded",
            FailureClass::IntegrationConflict => "integration_conflict",
            FailureClass::QualityBelowThreshold => "quality_below_threshold",
        };
        write!(f, "{s}")
    }
}

/// Decision returned by the degradation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackAction {
    /// Re-invoke the same component with the same input.
    Retry,
    /// Hand the slot to another matching component not already in the plan.
    Switch { component: String },
    /// Synthesize a minimal low-confidence result.
    GenericFallback,
    /// Stop; the slot keeps whatever status the caller assigns.
    Abort,
}

impl FallbackAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            FallbackAction::Retry => ActionKind::Retry,
            FallbackAction::Switch { .. } => ActionKind::SwitchComponent,
            FallbackAction::GenericFallback => ActionKind::GenericFallback,
            FallbackAction::Abort => ActionKind::Abort,
        }
    }
}

/// Serializable form of [`FallbackAction`] kept in audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Retry,
    SwitchComponent,
    GenericFallback,
    Abort,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionKind::Retry => "retry",
            ActionKind::SwitchComponent => "switch-component",
            ActionKind::GenericFallback => "generic-fallback",
            ActionKind::Abort => "abort",
        };
        write!(f, "{s}")
    }
}

/// Audit entry for one fallback decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradationRecord {
    pub stage: Stage,
    pub failure_class: FailureClass,
    pub action: ActionKind,
    /// Component slot the decision applies to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DegradationRecord {
    pub fn new(stage: Stage, failure_class: FailureClass, action: ActionKind) -> Self {
        Self {
            stage,
            failure_class,
            action,
            component: None,
            detail: None,
        }
    }

    pub fn for_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
