//! Degradation policy.
//!
//! A single policy table maps a [`FailureClass`] to a [`FallbackAction`]:
//!
//! | failure class            | actions, in order                      |
//! |--------------------------|----------------------------------------|
//! | `ComponentTimeout`       | retry → switch → generic fallback      |
//! | `ComponentError`         | switch → generic fallback              |
//! | `NoMatchingComponent`    | generic fallback                       |
//! | `InterpretationFailure`  | generic fallback                       |
//! | `DeadlineExceeded`       | abort (slot is marked degraded)        |
//! | `IntegrationConflict`    | abort (lower-confidence copy dropped)  |
//! | `QualityBelowThreshold`  | one validator retry → abort            |
//!
//! One [`DegradationManager`] lives per request. It enforces the request-wide
//! retry budget and appends exactly one [`DegradationRecord`] per call to
//! [`DegradationManager::resolve`].

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::debug;

use crate::config::PipelineConfig;
use crate::domain::{DegradationRecord, FailureClass, FallbackAction, Stage};
use crate::metrics::METRICS;
use crate::obs::emit_degradation_applied;

/// Limits the policy enforces for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackLimits {
    pub retry_budget: u32,
    pub per_component_retries: u32,
    pub allow_generic_fallback: bool,
}

impl From<&PipelineConfig> for FallbackLimits {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            retry_budget: config.retry_budget,
            per_component_retries: config.per_component_retries,
            allow_generic_fallback: config.allow_generic_fallback,
        }
    }
}

/// Where a failure happened.
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    pub stage: Stage,
    /// Slot id for execution failures.
    pub component: Option<&'a str>,
    /// Components a switch may hand the slot to, in preference order.
    pub switch_candidates: &'a [String],
    pub detail: Option<&'a str>,
}

impl<'a> FailureContext<'a> {
    pub fn stage(stage: Stage) -> Self {
        Self {
            stage,
            component: None,
            switch_candidates: &[],
            detail: None,
        }
    }

    pub fn component(component: &'a str, switch_candidates: &'a [String]) -> Self {
        Self {
            stage: Stage::Execute,
            component: Some(component),
            switch_candidates,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: &'a str) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// The action chosen plus the record appended for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub action: FallbackAction,
    pub record: DegradationRecord,
}

#[derive(Debug, Default)]
struct ManagerState {
    retries_used: u32,
    slot_retries: HashMap<String, u32>,
    switched_slots: HashSet<String>,
    claimed: HashSet<String>,
    validator_retry_used: bool,
    trail: Vec<DegradationRecord>,
}

/// Per-request degradation policy and audit trail.
#[derive(Debug)]
pub struct DegradationManager {
    limits: FallbackLimits,
    state: Mutex<ManagerState>,
}

impl DegradationManager {
    pub fn new(limits: FallbackLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(ManagerState::default()),
        }
    }

    pub fn limits(&self) -> FallbackLimits {
        self.limits
    }

    /// Decide what to do about `failure_class` and record the decision.
    pub fn resolve(&self, failure_class: FailureClass, ctx: FailureContext<'_>) -> Resolution {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let action = self.decide(&mut state, failure_class, &ctx);

        let mut record = DegradationRecord::new(ctx.stage, failure_class, action.kind());
        if let Some(component) = ctx.component {
            record = record.for_component(component);
        }
        let detail = match (&action, ctx.detail) {
            (FallbackAction::Switch { component }, Some(d)) => Some(format!("{d}; switched to {component}")),
            (FallbackAction::Switch { component }, None) => Some(format!("switched to {component}")),
            (_, Some(d)) => Some(d.to_string()),
            (_, None) => None,
        };
        if let Some(detail) = detail {
            record = record.with_detail(detail);
        }

        state.trail.push(record.clone());
        drop(state);

        METRICS.inc_degradations();
        emit_degradation_applied(&record);
        debug!(failure = %failure_class, action = %record.action, "degradation resolved");

        Resolution { action, record }
    }

    fn decide(
        &self,
        state: &mut ManagerState,
        failure_class: FailureClass,
        ctx: &FailureContext<'_>,
    ) -> FallbackAction {
        match failure_class {
            FailureClass::ComponentTimeout => self
                .try_retry(state, ctx)
                .or_else(|| Self::try_switch(state, ctx))
                .unwrap_or_else(|| self.generic_or_abort()),
            FailureClass::ComponentError => {
                Self::try_switch(state, ctx).unwrap_or_else(|| self.generic_or_abort())
            }
            FailureClass::NoMatchingComponent | FailureClass::InterpretationFailure => {
                self.generic_or_abort()
            }
            FailureClass::DeadlineExceeded | FailureClass::IntegrationConflict => {
                FallbackAction::Abort
            }
            FailureClass::QualityBelowThreshold => {
                if state.validator_retry_used {
                    FallbackAction::Abort
                } else {
                    state.validator_retry_used = true;
                    FallbackAction::Retry
                }
            }
        }
    }

    fn try_retry(&self, state: &mut ManagerState, ctx: &FailureContext<'_>) -> Option<FallbackAction> {
        let slot = ctx.component?;
        if state.switched_slots.contains(slot) || state.retries_used >= self.limits.retry_budget {
            return None;
        }
        let used = state.slot_retries.entry(slot.to_string()).or_insert(0);
        if *used >= self.limits.per_component_retries {
            return None;
        }
        *used = used.saturating_add(1);
        state.retries_used = state.retries_used.saturating_add(1);
        Some(FallbackAction::Retry)
    }

    fn try_switch(state: &mut ManagerState, ctx: &FailureContext<'_>) -> Option<FallbackAction> {
        let slot = ctx.component?;
        if state.switched_slots.contains(slot) {
            return None;
        }
        let target = ctx
            .switch_candidates
            .iter()
            .find(|c| c.as_str() != slot && !state.claimed.contains(c.as_str()))?
            .clone();
        state.claimed.insert(target.clone());
        state.switched_slots.insert(slot.to_string());
        Some(FallbackAction::Switch { component: target })
    }

    fn generic_or_abort(&self) -> FallbackAction {
        if self.limits.allow_generic_fallback {
            FallbackAction::GenericFallback
        } else {
            FallbackAction::Abort
        }
    }

    /// Component retries spent so far.
    pub fn retries_used(&self) -> u32 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).retries_used
    }

    /// Whether the single validator retry has been granted.
    pub fn validator_retry_used(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .validator_retry_used
    }

    /// Every decision taken so far, in order.
    pub fn trail(&self) -> Vec<DegradationRecord> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).trail.clone()
    }
}
