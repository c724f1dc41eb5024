//! Per-component last-known health.
//!
//! Updated once per coordinator round, after the join barrier, so component
//! tasks never touch it.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ActionKind, StageResult, StageStatus};
use crate::registry::ComponentRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
            HealthState::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub component_id: String,
    pub state: HealthState,
    pub last_latency_ms: Option<u64>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl ComponentHealth {
    fn unknown(component_id: &str) -> Self {
        Self {
            component_id: component_id.to_string(),
            state: HealthState::Unknown,
            last_latency_ms: None,
            last_checked: None,
        }
    }
}

/// Liveness probe output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessReport {
    pub registry_size: usize,
    pub components: Vec<ComponentHealth>,
}

#[derive(Debug, Default)]
pub struct HealthTracker {
    entries: RwLock<BTreeMap<String, ComponentHealth>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one round of results into the tracker.
    ///
    /// The slot component is judged by how its own call ended; when a switch
    /// happened the alternate that served the slot is recorded as healthy.
    pub fn record_results(&self, results: &[StageResult]) {
        let now = Utc::now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        for result in results {
            let state = slot_state(result);
            entries.insert(
                result.component_id.clone(),
                ComponentHealth {
                    component_id: result.component_id.clone(),
                    state,
                    last_latency_ms: Some(result.latency_ms),
                    last_checked: Some(now),
                },
            );
            if let Some(alternate) = result.served_by.as_deref() {
                entries.insert(
                    alternate.to_string(),
                    ComponentHealth {
                        component_id: alternate.to_string(),
                        state: HealthState::Healthy,
                        last_latency_ms: Some(result.latency_ms),
                        last_checked: Some(now),
                    },
                );
            }
        }
    }

    pub fn get(&self, component_id: &str) -> Option<ComponentHealth> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(component_id)
            .cloned()
    }

    /// Health for every registered component, `unknown` if never invoked.
    pub fn liveness(&self, registry: &ComponentRegistry) -> LivenessReport {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let components = registry
            .descriptors()
            .map(|d| {
                entries
                    .get(&d.id)
                    .cloned()
                    .unwrap_or_else(|| ComponentHealth::unknown(&d.id))
            })
            .collect();
        LivenessReport {
            registry_size: registry.len(),
            components,
        }
    }
}

fn slot_state(result: &StageResult) -> HealthState {
    match result.status {
        StageStatus::Succeeded => HealthState::Healthy,
        StageStatus::Failed => HealthState::Unhealthy,
        StageStatus::Degraded => match result.degradation.as_ref().map(|r| r.action) {
            // A slot that fell back lost its own call.
            Some(ActionKind::GenericFallback) | Some(ActionKind::SwitchComponent) => {
                HealthState::Unhealthy
            }
            _ => HealthState::Degraded,
        },
    }
}
