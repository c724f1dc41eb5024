//! Concurrency bound and deadline behaviour of the execution stage.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqflow_core::{
    AnalysisComponent, ComponentDescriptor, ComponentError, ComponentOutput, ComponentRegistry,
    FailureClass, FixedComponent, Pipeline, PipelineConfig, ReportStatus, Requirement,
    StageStatus,
};

/// Tracks how many calls are in flight at once.
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct Probe {
    id: String,
    gauge: Arc<Gauge>,
}

#[async_trait]
impl AnalysisComponent for Probe {
    async fn execute(&self, _r: &Requirement) -> Result<ComponentOutput, ComponentError> {
        let now = self.gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
        Ok(ComponentOutput::text(
            format!("load findings from {}", self.id),
            0.8,
        ))
    }
}

#[tokio::test(start_paused = true)]
async fn never_more_than_max_concurrency_calls_in_flight() {
    let gauge = Arc::new(Gauge::default());
    let registry = (0..6)
        .fold(ComponentRegistry::builder(), |b, i| {
            let id = format!("probe-{i}");
            b.register(
                ComponentDescriptor::new(id.clone(), ["load"]).with_priority(1),
                Arc::new(Probe {
                    id,
                    gauge: Arc::clone(&gauge),
                }),
            )
        })
        .build()
        .unwrap();
    let config = PipelineConfig {
        max_components: 6,
        max_concurrency: 2,
        ..PipelineConfig::default()
    };
    let report = Pipeline::new(Arc::new(registry), config)
        .analyze("Run the load analysis", BTreeMap::new())
        .await;

    assert_eq!(report.results.len(), 6);
    assert!(report
        .results
        .iter()
        .all(|r| r.status == StageStatus::Succeeded));
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
    assert_eq!(gauge.current.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn global_deadline_cancels_slow_components() {
    let registry = ComponentRegistry::builder()
        .register(
            ComponentDescriptor::new("fast", ["finance"]).with_priority(1),
            Arc::new(FixedComponent::text("The finance numbers are final.", 0.8)),
        )
        .register(
            ComponentDescriptor::new("slow", ["finance"])
                .with_priority(1)
                .with_timeout(Duration::from_secs(120)),
            Arc::new(FixedComponent::text("never arrives", 0.9).with_delay(Duration::from_secs(60))),
        )
        .build()
        .unwrap();
    let config = PipelineConfig {
        global_deadline_ms: 1_000,
        ..PipelineConfig::default()
    };
    let bound = config.global_deadline() + config.validator_retry_deadline();
    let report = Pipeline::new(Arc::new(registry), config)
        .analyze("Are the finance numbers final?", BTreeMap::new())
        .await;

    assert_eq!(report.status, ReportStatus::Degraded);
    let slow = report
        .results
        .iter()
        .find(|r| r.component_id == "slow")
        .unwrap();
    assert_eq!(slow.status, StageStatus::Degraded);
    assert!(slow.payload.is_none());
    assert_eq!(
        slow.degradation.as_ref().unwrap().failure_class,
        FailureClass::DeadlineExceeded
    );
    assert_eq!(report.degradations.len(), 1);
    // the cancelled slot does not drag the aggregate down
    assert_eq!(report.aggregate_confidence, 0.8);
    assert!(u128::from(report.processing_time_ms) <= bound.as_millis());
}

#[tokio::test]
async fn concurrent_requests_share_one_pipeline() {
    let registry = ComponentRegistry::builder()
        .register(
            ComponentDescriptor::new("finance", ["finance"]).with_priority(1),
            Arc::new(FixedComponent::text("Budget approved.", 0.9)),
        )
        .build()
        .unwrap();
    let pipeline = Arc::new(Pipeline::new(Arc::new(registry), PipelineConfig::default()));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                pipeline
                    .analyze(format!("Is the finance budget approved #{i}?"), BTreeMap::new())
                    .await
            })
        })
        .collect();

    for handle in handles {
        let report = handle.await.unwrap();
        assert_eq!(report.status, ReportStatus::Ok);
        assert!(report.fallback_trail.is_empty());
    }
}
