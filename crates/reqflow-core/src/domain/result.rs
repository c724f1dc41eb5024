//! Execution-side vocabulary: `ExecutionPlan`, `StageStatus`, `StageResult`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::degradation::DegradationRecord;

/// Components chosen for a request plus the execution strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Ranked component ids. Never empty.
    pub component_ids: Vec<String>,
    /// Eligible components that did not fit under the cap, in rank order.
    /// Consumed by the switch fallback.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternates: Vec<String>,
    pub max_concurrency: usize,
    pub global_deadline_ms: u64,
    /// `true` when no component matched and the generic fallback was substituted.
    #[serde(default)]
    pub fallback_substituted: bool,
}

impl ExecutionPlan {
    pub fn global_deadline(&self) -> Duration {
        Duration::from_millis(self.global_deadline_ms)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.component_ids.iter().any(|c| c == id)
    }
}

/// Final status of one component slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Degraded,
    Failed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageStatus::Succeeded => "succeeded",
            StageStatus::Degraded => "degraded",
            StageStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Outcome of one component slot. Immutable once the coordinator returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Slot id: the component the plan selected.
    pub component_id: String,
    /// Component that actually produced the payload when a switch happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub served_by: Option<String>,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Always within 0..1.
    pub confidence: f64,
    pub latency_ms: u64,
    /// Present exactly when `status != Succeeded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation: Option<DegradationRecord>,
    /// 0 for the primary execution, 1 for the validator retry.
    #[serde(default)]
    pub round: u8,
}

impl StageResult {
    pub fn succeeded(
        component_id: impl Into<String>,
        payload: serde_json::Value,
        confidence: f64,
        latency: Duration,
    ) -> Self {
        Self {
            component_id: component_id.into(),
            served_by: None,
            status: StageStatus::Succeeded,
            payload: Some(payload),
            confidence: clamp_confidence(confidence),
            latency_ms: millis(latency),
            degradation: None,
            round: 0,
        }
    }

    pub fn degraded(
        component_id: impl Into<String>,
        payload: Option<serde_json::Value>,
        confidence: f64,
        latency: Duration,
        record: DegradationRecord,
    ) -> Self {
        Self {
            component_id: component_id.into(),
            served_by: None,
            status: StageStatus::Degraded,
            payload,
            confidence: clamp_confidence(confidence),
            latency_ms: millis(latency),
            degradation: Some(record),
            round: 0,
        }
    }

    pub fn failed(
        component_id: impl Into<String>,
        latency: Duration,
        record: DegradationRecord,
    ) -> Self {
        Self {
            component_id: component_id.into(),
            served_by: None,
            status: StageStatus::Failed,
            payload: None,
            confidence: 0.0,
            latency_ms: millis(latency),
            degradation: Some(record),
            round: 0,
        }
    }

    pub fn served_by(mut self, component: impl Into<String>) -> Self {
        self.served_by = Some(component.into());
        self
    }

    pub fn in_round(mut self, round: u8) -> Self {
        self.round = round;
        self
    }

    /// Component whose descriptor describes the payload.
    pub fn source_component(&self) -> &str {
        self.served_by.as_deref().unwrap_or(&self.component_id)
    }

    /// Whether the result carries content the integrator can use.
    pub fn is_usable(&self) -> bool {
        self.status != StageStatus::Failed
            && self.payload.as_ref().is_some_and(|p| !p.is_null())
    }
}

/// Clamp into 0..1, mapping NaN to 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
