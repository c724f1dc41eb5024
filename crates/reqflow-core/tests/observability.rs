//! Structured tracing events emitted by the pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use reqflow_core::{
    emit_component_finished, emit_request_finished, emit_request_started, emit_stage_transition,
    emit_validator_retry, ComponentDescriptor, ComponentRegistry, FixedComponent, Pipeline,
    PipelineConfig, ReportStatus, RequestSpan, StageStatus, METRICS,
};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_request_started_logs_id_and_digest() {
    emit_request_started("req-123", "abc123", 42);
    assert!(logs_contain("request.started"));
    assert!(logs_contain("req-123"));
}

#[traced_test]
#[test]
fn test_emit_stage_transition_logs_state() {
    emit_stage_transition("req-1", "selecting");
    assert!(logs_contain("stage.transition"));
    assert!(logs_contain("selecting"));
}

#[traced_test]
#[test]
fn test_emit_component_finished_logs_status() {
    emit_component_finished("finance", StageStatus::Degraded, 0.3, 120, 1);
    assert!(logs_contain("component.finished"));
    assert!(logs_contain("degraded"));
}

#[traced_test]
#[test]
fn test_emit_validator_retry_and_finish() {
    emit_validator_retry("req-9", 2, 0.41);
    emit_request_finished("req-9", ReportStatus::Degraded, 0.41, 3, 950);
    assert!(logs_contain("validator.retry"));
    assert!(logs_contain("request.finished"));
}

#[traced_test]
#[test]
fn test_request_span_enter_creates_span() {
    let span = RequestSpan::enter("span-req");
    emit_stage_transition("span-req", "interpreting");
    drop(span);
    assert!(logs_contain("span-req"));
}

#[tokio::test]
#[traced_test]
async fn test_pipeline_emits_lifecycle_events() {
    let registry = ComponentRegistry::builder()
        .register(
            ComponentDescriptor::new("finance", ["finance"]).with_priority(1),
            Arc::new(FixedComponent::text("Budget approved.", 0.9)),
        )
        .build()
        .unwrap();
    let pipeline = Pipeline::new(Arc::new(registry), PipelineConfig::default());

    let report = pipeline
        .analyze("Is the finance budget approved?", BTreeMap::new())
        .await;
    assert!(logs_contain("request.started"));
    assert!(logs_contain("stage.transition"));
    assert!(logs_contain("component.finished"));
    assert!(logs_contain("request.finished"));
    assert!(logs_contain(&report.request_id));
    assert!(METRICS.requests_analyzed() >= 1);
}

#[tokio::test]
#[traced_test]
async fn test_interpretation_failure_is_logged_as_degradation() {
    let pipeline = Pipeline::new(
        Arc::new(ComponentRegistry::builder().build().unwrap()),
        PipelineConfig::default(),
    );
    let report = pipeline.analyze("   ", BTreeMap::new()).await;
    assert_ne!(report.status, ReportStatus::Ok);
    assert!(logs_contain("degradation.applied"));
    assert!(logs_contain("interpretation_failure"));
}
