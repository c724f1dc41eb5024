//! Structured observability hooks for the analysis pipeline.
//!
//! This module provides:
//! - Request-scoped tracing spans via the `RequestSpan` RAII guard
//! - Emission functions for lifecycle events: request start and finish,
//!   stage transitions, component completion, degradations, validator retry
//!
//! Events are emitted at `info!` level under a stable `event` field so they
//! can be filtered from JSON logs.

use tracing::info;

use crate::domain::{DegradationRecord, ReportStatus, StageStatus};

/// RAII guard that enters a request-scoped span for the duration of a request.
///
/// ```ignore
/// let _span = RequestSpan::enter("9b0c…");
/// // every event below is tagged with request_id
/// ```
pub struct RequestSpan {
    _span: tracing::span::EnteredSpan,
}

impl RequestSpan {
    pub fn enter(request_id: &str) -> Self {
        Self {
            _span: request_span(request_id).entered(),
        }
    }
}

/// The request span itself, for attaching to futures with
/// `tracing::Instrument` (an entered guard must not be held across `.await`).
pub fn request_span(request_id: &str) -> tracing::Span {
    tracing::info_span!("reqflow.request", request_id = %request_id)
}

/// Emit event: request accepted.
pub fn emit_request_started(request_id: &str, digest: &str, text_len: usize) {
    info!(
        event = "request.started",
        request_id = %request_id,
        digest = %digest,
        text_len = text_len,
    );
}

/// Emit event: pipeline moved to `state`.
pub fn emit_stage_transition(request_id: &str, state: &str) {
    info!(event = "stage.transition", request_id = %request_id, state = %state);
}

/// Emit event: one component slot settled.
pub fn emit_component_finished(
    component_id: &str,
    status: StageStatus,
    confidence: f64,
    latency_ms: u64,
    round: u8,
) {
    info!(
        event = "component.finished",
        component_id = %component_id,
        status = %status,
        confidence = confidence,
        latency_ms = latency_ms,
        round = round,
    );
}

/// Emit event: a fallback decision was taken (warning level).
pub fn emit_degradation_applied(record: &DegradationRecord) {
    tracing::warn!(
        event = "degradation.applied",
        stage = %record.stage,
        failure_class = %record.failure_class,
        action = %record.action,
        component = record.component.as_deref().unwrap_or("-"),
        detail = record.detail.as_deref().unwrap_or(""),
    );
}

/// Emit event: the validator asked for its single re-run.
pub fn emit_validator_retry(request_id: &str, weak_questions: usize, aggregate_confidence: f64) {
    info!(
        event = "validator.retry",
        request_id = %request_id,
        weak_questions = weak_questions,
        aggregate_confidence = aggregate_confidence,
    );
}

/// Emit event: report returned to the caller.
pub fn emit_request_finished(
    request_id: &str,
    status: ReportStatus,
    aggregate_confidence: f64,
    degradations: usize,
    duration_ms: u64,
) {
    info!(
        event = "request.finished",
        request_id = %request_id,
        status = %status,
        aggregate_confidence = aggregate_confidence,
        degradations = degradations,
        duration_ms = duration_ms,
    );
}
