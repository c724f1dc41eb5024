//! End-to-end pipeline scenarios: success, timeout, no match, validator
//! retry, and the always-respond guarantees.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqflow_core::{
    ActionKind, AnalysisComponent, ComponentDescriptor, ComponentError, ComponentOutput,
    ComponentRegistry, FailureClass, FixedComponent, Pipeline, PipelineConfig, ReportStatus,
    Requirement, SectionKind, Stage, StageStatus,
};

/// Fixed text output that counts its invocations.
struct Counting {
    text: String,
    confidence: f64,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl AnalysisComponent for Counting {
    async fn execute(&self, _r: &Requirement) -> Result<ComponentOutput, ComponentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ComponentOutput::text(self.text.clone(), self.confidence))
    }
}

/// Always errors.
struct Failing;

#[async_trait]
impl AnalysisComponent for Failing {
    async fn execute(&self, _r: &Requirement) -> Result<ComponentOutput, ComponentError> {
        Err(ComponentError::failed("failing", "upstream unavailable"))
    }
}

fn finance_desc() -> ComponentDescriptor {
    ComponentDescriptor::new("finance", ["finance"])
        .with_priority(2)
        .with_trust_weight(0.6)
        .with_timeout(Duration::from_millis(500))
}

fn ops_desc() -> ComponentDescriptor {
    ComponentDescriptor::new("ops", ["ops"])
        .with_priority(2)
        .with_trust_weight(0.4)
        .with_timeout(Duration::from_millis(100))
}

fn finance() -> Arc<FixedComponent> {
    Arc::new(FixedComponent::text(
        "Finance: the budget for the launch is approved.",
        0.9,
    ))
}

fn pipeline(registry: ComponentRegistry, config: PipelineConfig) -> Pipeline {
    Pipeline::new(Arc::new(registry), config)
}

const LAUNCH: &str = "Assess finance and ops readiness for the launch.";

// ---------------------------------------------------------------------------
// Scenario A: two matching components succeed.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_a_two_components_succeed() {
    let registry = ComponentRegistry::builder()
        .register(finance_desc(), finance())
        .register(
            ops_desc(),
            Arc::new(FixedComponent::text(
                "Ops: on-call staffing for the launch is ready.",
                0.8,
            )),
        )
        .build()
        .unwrap();
    let report = pipeline(registry, PipelineConfig::default())
        .analyze(LAUNCH, BTreeMap::new())
        .await;

    assert_eq!(report.status, ReportStatus::Ok);
    assert!((report.aggregate_confidence - 0.86).abs() < 1e-9);
    assert_eq!(report.sections.len(), 2);
    assert!(report.degradations.is_empty());
    assert!(report.fallback_trail.is_empty());
    assert!(!report.validator_retried);
    assert_eq!(report.request_id.len(), 36);
    assert_eq!(report.requirement_digest.len(), 64);
}

// ---------------------------------------------------------------------------
// Scenario B: one component times out.
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn scenario_b_timeout_degrades_with_fallback_section() {
    let registry = ComponentRegistry::builder()
        .register(finance_desc(), finance())
        .register(
            ops_desc(),
            Arc::new(FixedComponent::text("too late", 0.8).with_delay(Duration::from_secs(10))),
        )
        .build()
        .unwrap();
    let report = pipeline(registry, PipelineConfig::default())
        .analyze(LAUNCH, BTreeMap::new())
        .await;

    assert_eq!(report.status, ReportStatus::Degraded);
    assert_eq!(report.degradations.len(), 1);
    let record = &report.degradations[0];
    assert_eq!(record.failure_class, FailureClass::ComponentTimeout);
    assert_eq!(record.component.as_deref(), Some("ops"));
    assert_eq!(record.action, ActionKind::GenericFallback);

    let fallback = report
        .sections
        .iter()
        .find(|s| s.source_components == vec!["ops".to_string()])
        .expect("fallback section for the timed-out component");
    assert_eq!(fallback.kind, SectionKind::Caveats);
    assert_eq!(fallback.confidence, 0.3);

    // the timeout was retried once before falling back
    let trail: Vec<ActionKind> = report.fallback_trail.iter().map(|r| r.action).collect();
    assert_eq!(trail, vec![ActionKind::Retry, ActionKind::GenericFallback]);
    assert!((report.aggregate_confidence - 0.66).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// Scenario C: nothing matches, the generic fallback is substituted.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_c_no_match_uses_generic_fallback() {
    let registry = ComponentRegistry::builder()
        .register(finance_desc(), finance())
        .build()
        .unwrap();
    let report = pipeline(registry, PipelineConfig::default())
        .analyze("Forecast the weather for the picnic.", BTreeMap::new())
        .await;

    assert_eq!(report.status, ReportStatus::Degraded);
    assert_eq!(report.sections.len(), 1);
    assert_eq!(report.sections[0].source_components, vec!["generic"]);
    assert_eq!(report.sections[0].confidence, 0.3);
    assert_eq!(report.aggregate_confidence, 0.3);

    let first = &report.degradations[0];
    assert_eq!(first.stage, Stage::Select);
    assert_eq!(first.failure_class, FailureClass::NoMatchingComponent);
    assert_eq!(first.action, ActionKind::GenericFallback);
}

#[tokio::test]
async fn fallback_tag_in_text_still_counts_as_no_match() {
    let registry = ComponentRegistry::builder()
        .register(finance_desc(), finance())
        .build()
        .unwrap();
    let report = pipeline(registry, PipelineConfig::default())
        .analyze("Give a generic weather forecast.", BTreeMap::new())
        .await;

    assert_eq!(report.status, ReportStatus::Degraded);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].component_id, "generic");
    assert_eq!(report.results[0].status, StageStatus::Degraded);
    assert_eq!(report.aggregate_confidence, 0.3);

    let first = &report.degradations[0];
    assert_eq!(first.stage, Stage::Select);
    assert_eq!(first.failure_class, FailureClass::NoMatchingComponent);
}

#[tokio::test]
async fn fallback_is_not_run_beside_a_real_match() {
    let registry = ComponentRegistry::builder()
        .register(finance_desc(), finance())
        .build()
        .unwrap();
    let report = pipeline(registry, PipelineConfig::default())
        .analyze(
            "Is the finance budget approved? generic notes welcome.",
            BTreeMap::new(),
        )
        .await;

    assert_eq!(report.status, ReportStatus::Ok);
    let ran: Vec<&str> = report
        .results
        .iter()
        .map(|r| r.component_id.as_str())
        .collect();
    assert_eq!(ran, vec!["finance"]);
    assert!((report.aggregate_confidence - 0.9).abs() < 1e-9);
    assert!(report.fallback_trail.is_empty());
}

// ---------------------------------------------------------------------------
// Scenario D: an unaddressed key question triggers exactly one retry.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_d_validator_retries_once_then_adds_caveat() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = ComponentRegistry::builder()
        .register(
            finance_desc(),
            Arc::new(Counting {
                text: "Revenue grew steadily this quarter.".to_string(),
                confidence: 0.9,
                calls: Arc::clone(&calls),
            }),
        )
        .build()
        .unwrap();
    let question = "What is the finance outlook for churn?";
    let report = pipeline(registry, PipelineConfig::default())
        .analyze(question, BTreeMap::new())
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 2, "one primary call, one retry");
    assert!(report.validator_retried);
    assert_eq!(report.status, ReportStatus::Degraded);
    assert_eq!(
        report.caveats,
        vec![format!("Key question not addressed: {question}")]
    );
    assert_eq!(report.results.iter().filter(|r| r.round == 1).count(), 1);

    let quality: Vec<ActionKind> = report
        .fallback_trail
        .iter()
        .filter(|r| r.failure_class == FailureClass::QualityBelowThreshold)
        .map(|r| r.action)
        .collect();
    assert_eq!(quality, vec![ActionKind::Retry, ActionKind::Abort]);
}

// ---------------------------------------------------------------------------
// Always-respond
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn empty_text_still_yields_a_report() {
    let config = PipelineConfig::default();
    let bound = config.global_deadline() + config.validator_retry_deadline();
    let registry = ComponentRegistry::builder()
        .register(finance_desc(), finance())
        .build()
        .unwrap();
    let p = pipeline(registry, config);

    let report = tokio::time::timeout(bound, p.analyze("", BTreeMap::new()))
        .await
        .expect("report within the end-to-end bound");

    assert_ne!(report.status, ReportStatus::Ok);
    assert!(!report.sections.is_empty());
    let first = &report.degradations[0];
    assert_eq!(first.stage, Stage::Interpret);
    assert_eq!(first.failure_class, FailureClass::InterpretationFailure);
    assert_eq!(report.key_questions, vec![String::new()]);
}

#[tokio::test]
async fn total_failure_yields_minimal_failed_report() {
    let registry = ComponentRegistry::builder()
        .register(finance_desc(), Arc::new(Failing))
        .build()
        .unwrap();
    let config = PipelineConfig {
        allow_generic_fallback: false,
        ..PipelineConfig::default()
    };
    let report = pipeline(registry, config)
        .analyze("Check the finance numbers", BTreeMap::new())
        .await;

    assert_eq!(report.status, ReportStatus::Failed);
    assert_eq!(report.aggregate_confidence, 0.0);
    assert_eq!(report.sections.len(), 1);
    assert!(report.sections[0].source_components.is_empty());
    assert!(report
        .results
        .iter()
        .all(|r| r.status == StageStatus::Failed));
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn every_non_succeeded_result_has_one_record() {
    let registry = ComponentRegistry::builder()
        .register(finance_desc(), finance())
        .register(
            ops_desc(),
            Arc::new(FixedComponent::text("late", 0.8).with_delay(Duration::from_secs(10))),
        )
        .register(
            ComponentDescriptor::new("broken", ["ops"]).with_priority(1),
            Arc::new(Failing),
        )
        .build()
        .unwrap();
    let report = pipeline(registry, PipelineConfig::default())
        .analyze(LAUNCH, BTreeMap::new())
        .await;

    for result in report.results.iter().filter(|r| r.status != StageStatus::Succeeded) {
        let record = result
            .degradation
            .as_ref()
            .expect("non-succeeded result carries a record");
        assert_eq!(
            report.degradations.iter().filter(|d| *d == record).count(),
            1,
            "record for {}",
            result.component_id
        );
    }
    let non_succeeded = report
        .results
        .iter()
        .filter(|r| r.status != StageStatus::Succeeded)
        .count();
    assert_eq!(report.degradations.len(), non_succeeded);
}

#[tokio::test]
async fn confidence_never_exceeds_best_result() {
    let registry = ComponentRegistry::builder()
        .register(finance_desc(), finance())
        .register(
            ops_desc(),
            Arc::new(FixedComponent::text("Ops: launch staffing is thin.", 0.4)),
        )
        .build()
        .unwrap();
    let report = pipeline(registry, PipelineConfig::default())
        .analyze(LAUNCH, BTreeMap::new())
        .await;

    let best = report
        .results
        .iter()
        .filter(|r| r.status != StageStatus::Failed)
        .map(|r| r.confidence)
        .fold(0.0, f64::max);
    assert!(report.aggregate_confidence <= best);
    assert!(report
        .results
        .iter()
        .all(|r| (0.0..=1.0).contains(&r.confidence)));
}

#[tokio::test]
async fn identical_requests_produce_identical_plans_and_sections() {
    let registry = ComponentRegistry::builder()
        .register(finance_desc(), finance())
        .register(
            ops_desc(),
            Arc::new(FixedComponent::text("Ops: staffing is ready.", 0.8)),
        )
        .register(
            ComponentDescriptor::new("audit", ["finance", "ops"]).with_priority(1),
            Arc::new(FixedComponent::text("Audit: controls reviewed for the launch.", 0.7)),
        )
        .build()
        .unwrap();
    let p = pipeline(
        registry,
        PipelineConfig {
            max_components: 2,
            ..PipelineConfig::default()
        },
    );
    let req = Requirement::new(LAUNCH);

    let first = p.plan(&req);
    for _ in 0..10 {
        assert_eq!(p.plan(&req), first);
    }
    // audit: 2 tags x 1 = 2; finance and ops: 1 tag x 2 = 2; priority breaks the tie
    assert_eq!(first.plan.component_ids, vec!["finance", "ops"]);
    assert_eq!(first.plan.alternates, vec!["audit"]);

    let a = p.analyze_requirement(req.clone()).await;
    let b = p.analyze_requirement(req).await;
    assert_eq!(a.section_names(), b.section_names());
    assert_ne!(a.request_id, b.request_id);
    assert_eq!(a.requirement_digest, b.requirement_digest);
}

#[tokio::test]
async fn failing_component_switches_to_alternate() {
    let registry = ComponentRegistry::builder()
        .register(
            ComponentDescriptor::new("primary", ["finance"]).with_priority(5),
            Arc::new(Failing),
        )
        .register(
            ComponentDescriptor::new("backup", ["finance"]).with_priority(1),
            Arc::new(FixedComponent::text("Backup: finance review of the budget.", 0.7)),
        )
        .build()
        .unwrap();
    let p = pipeline(
        registry,
        PipelineConfig {
            max_components: 1,
            ..PipelineConfig::default()
        },
    );
    let report = p.analyze("Review the finance budget", BTreeMap::new()).await;

    assert_eq!(report.status, ReportStatus::Degraded);
    let result = &report.results[0];
    assert_eq!(result.component_id, "primary");
    assert_eq!(result.served_by.as_deref(), Some("backup"));
    assert_eq!(report.degradations.len(), 1);
    assert_eq!(report.degradations[0].action, ActionKind::SwitchComponent);
    assert_eq!(report.sections[0].source_components, vec!["backup"]);
}

#[tokio::test]
async fn context_domains_and_preferred_components_steer_selection() {
    let registry = ComponentRegistry::builder()
        .register(finance_desc(), finance())
        .register(
            ComponentDescriptor::new("legal", ["legal"]).with_priority(1),
            Arc::new(FixedComponent::text("Legal: contracts allow the launch.", 0.8)),
        )
        .build()
        .unwrap();
    let p = pipeline(registry, PipelineConfig::default());

    let ctx = BTreeMap::from([("domain".to_string(), "legal".to_string())]);
    let preview = p.plan(&Requirement::new("Is the launch allowed?").with_context(ctx));
    assert_eq!(preview.plan.component_ids, vec!["legal"]);

    let preview = p.plan(
        &Requirement::new("Is the launch allowed?").with_preferred(vec!["finance".to_string()]),
    );
    assert_eq!(preview.plan.component_ids, vec!["finance"]);
}

#[tokio::test]
async fn liveness_reflects_last_run() {
    let registry = ComponentRegistry::builder()
        .register(finance_desc(), finance())
        .build()
        .unwrap();
    let p = pipeline(registry, PipelineConfig::default());
    let before = p.liveness();
    assert_eq!(before.registry_size, 2);

    p.analyze("Review the finance budget", BTreeMap::new()).await;
    let after = p.liveness();
    let fin = after
        .components
        .iter()
        .find(|c| c.component_id == "finance")
        .unwrap();
    assert_eq!(fin.state, reqflow_core::HealthState::Healthy);
    assert!(fin.last_checked.is_some());
}
