//! Concurrent component execution.
//!
//! Every selected component runs in its own task, gated by a semaphore sized
//! to `plan.max_concurrency`. Each call is bounded by the descriptor timeout;
//! the whole round is bounded by one deadline, after which in-flight tasks are
//! aborted and their slots settle as `Degraded` with `DeadlineExceeded`.
//!
//! Failures are handed to the request's [`DegradationManager`]; a slot task
//! loops until the manager's answer settles it. Results come back sorted by
//! component id regardless of completion order.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::degradation::{DegradationManager, FailureContext};
use crate::domain::{
    ComponentError, DegradationRecord, ExecutionPlan, FailureClass, FallbackAction, Requirement,
    StageResult,
};
use crate::health::HealthTracker;
use crate::metrics::METRICS;
use crate::obs::emit_component_finished;
use crate::registry::ComponentRegistry;

/// Runs execution plans against a shared registry.
#[derive(Debug, Clone)]
pub struct ExecutionCoordinator {
    registry: Arc<ComponentRegistry>,
    health: Arc<HealthTracker>,
    generic_confidence: f64,
}

/// Everything a slot task needs, cloned once per round.
struct RoundContext {
    registry: Arc<ComponentRegistry>,
    requirement: Arc<Requirement>,
    manager: Arc<DegradationManager>,
    alternates: Vec<String>,
    generic_confidence: f64,
    round: u8,
}

enum CallOutcome {
    Done(crate::domain::ComponentOutput),
    Failed(FailureClass, String),
}

impl ExecutionCoordinator {
    pub fn new(
        registry: Arc<ComponentRegistry>,
        health: Arc<HealthTracker>,
        generic_confidence: f64,
    ) -> Self {
        Self {
            registry,
            health,
            generic_confidence,
        }
    }

    /// Execute `plan` under its own global deadline.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        requirement: Arc<Requirement>,
        manager: Arc<DegradationManager>,
    ) -> Vec<StageResult> {
        self.execute_round(plan, requirement, manager, 0, plan.global_deadline())
            .await
    }

    /// Execute `plan` as `round`, bounded by `deadline`.
    #[instrument(skip_all, fields(round = round, slots = plan.component_ids.len()))]
    pub async fn execute_round(
        &self,
        plan: &ExecutionPlan,
        requirement: Arc<Requirement>,
        manager: Arc<DegradationManager>,
        round: u8,
        deadline: Duration,
    ) -> Vec<StageResult> {
        let started = Instant::now();
        let deadline_at = started + deadline;
        let sem = Arc::new(Semaphore::new(plan.max_concurrency.max(1)));
        let ctx = Arc::new(RoundContext {
            registry: Arc::clone(&self.registry),
            requirement,
            manager: Arc::clone(&manager),
            alternates: plan.alternates.clone(),
            generic_confidence: self.generic_confidence,
            round,
        });

        let mut pending: BTreeSet<String> = plan.component_ids.iter().cloned().collect();
        let mut tasks = JoinSet::new();
        for slot in &pending {
            let ctx = Arc::clone(&ctx);
            let sem = Arc::clone(&sem);
            let slot = slot.clone();
            tasks.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                run_slot(slot, ctx).await
            });
        }

        let mut results = Vec::with_capacity(pending.len());
        let mut deadline_hit = false;
        loop {
            match tokio::time::timeout_at(deadline_at, tasks.join_next()).await {
                Ok(Some(Ok(result))) => {
                    pending.remove(&result.component_id);
                    results.push(result);
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "component task did not complete");
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    tasks.abort_all();
                    break;
                }
            }
        }
        drop(tasks);

        let elapsed = started.elapsed();
        for slot in pending {
            let (class, detail) = if deadline_hit {
                (
                    FailureClass::DeadlineExceeded,
                    format!("stage deadline of {}ms exceeded", deadline.as_millis()),
                )
            } else {
                (FailureClass::ComponentError, "component task terminated".to_string())
            };
            let resolution = manager.resolve(
                class,
                FailureContext::component(&slot, &[]).with_detail(&detail),
            );
            let result = match resolution.action {
                FallbackAction::GenericFallback => {
                    synthesize_fallback(&slot, class, self.generic_confidence, elapsed, resolution.record)
                }
                FallbackAction::Abort if class == FailureClass::DeadlineExceeded => {
                    StageResult::degraded(&slot, None, 0.0, elapsed, resolution.record)
                }
                _ => StageResult::failed(&slot, elapsed, resolution.record),
            };
            results.push(result.in_round(round));
        }

        results.sort_by(|a, b| a.component_id.cmp(&b.component_id));
        for r in &results {
            emit_component_finished(r.source_component(), r.status, r.confidence, r.latency_ms, r.round);
        }
        self.health.record_results(&results);
        debug!(results = results.len(), deadline_hit, "round settled");
        results
    }
}

/// Drive one slot until the degradation policy settles it.
async fn run_slot(slot: String, ctx: Arc<RoundContext>) -> StageResult {
    let started = Instant::now();
    let mut target = slot.clone();
    let mut switch_record: Option<DegradationRecord> = None;

    loop {
        let outcome = invoke(&ctx, &target).await;
        let (class, detail) = match outcome {
            CallOutcome::Done(output) => {
                let result = match switch_record {
                    Some(record) => StageResult::degraded(
                        &slot,
                        Some(output.payload),
                        output.confidence,
                        started.elapsed(),
                        record,
                    )
                    .served_by(&target),
                    None => StageResult::succeeded(
                        &slot,
                        output.payload,
                        output.confidence,
                        started.elapsed(),
                    ),
                };
                return result.in_round(ctx.round);
            }
            CallOutcome::Failed(class, detail) => (class, detail),
        };

        let resolution = ctx.manager.resolve(
            class,
            FailureContext::component(&slot, &ctx.alternates).with_detail(&detail),
        );
        match resolution.action {
            FallbackAction::Retry => {
                debug!(component = %target, "retrying component");
            }
            FallbackAction::Switch { component } => {
                target = component;
                switch_record = Some(resolution.record);
            }
            FallbackAction::GenericFallback => {
                return synthesize_fallback(
                    &slot,
                    class,
                    ctx.generic_confidence,
                    started.elapsed(),
                    resolution.record,
                )
                .in_round(ctx.round);
            }
            FallbackAction::Abort => {
                return StageResult::failed(&slot, started.elapsed(), resolution.record)
                    .in_round(ctx.round);
            }
        }
    }
}

/// One timeout-bounded call. Panics inside the component are caught and
/// reported as component errors.
async fn invoke(ctx: &RoundContext, component_id: &str) -> CallOutcome {
    let Some(entry) = ctx.registry.get(component_id) else {
        return CallOutcome::Failed(
            FailureClass::ComponentError,
            format!("component not registered: {component_id}"),
        );
    };
    METRICS.inc_invocations();

    let budget = entry.descriptor.timeout();
    let call = AssertUnwindSafe(entry.component.execute(&ctx.requirement)).catch_unwind();
    match tokio::time::timeout(budget, call).await {
        Ok(Ok(Ok(output))) => CallOutcome::Done(output),
        Ok(Ok(Err(e))) => CallOutcome::Failed(FailureClass::ComponentError, e.to_string()),
        Ok(Err(_panic)) => CallOutcome::Failed(
            FailureClass::ComponentError,
            ComponentError::failed(component_id, "component panicked").to_string(),
        ),
        Err(_) => CallOutcome::Failed(
            FailureClass::ComponentTimeout,
            format!("{component_id} timed out after {}ms", budget.as_millis()),
        ),
    }
}

/// Minimal low-confidence stand-in for a slot that produced nothing.
fn synthesize_fallback(
    slot: &str,
    class: FailureClass,
    confidence: f64,
    latency: Duration,
    record: DegradationRecord,
) -> StageResult {
    let payload = serde_json::json!({
        "caveats": format!(
            "No analysis from {slot} ({class}); generic fallback applied."
        )
    });
    StageResult::degraded(slot, Some(payload), confidence, latency, record)
}
