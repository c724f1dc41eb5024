//! The end-to-end analysis pipeline.
//!
//! `Interpreting → Selecting → Executing → Integrating → Validating →
//! Completed`. Every stage recovers locally through the request's
//! [`DegradationManager`], so [`Pipeline::analyze`] always returns a report.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::config::{PipelineConfig, ReqflowConfig};
use crate::coordinator::ExecutionCoordinator;
use crate::degradation::{DegradationManager, FailureContext, FallbackLimits, Resolution};
use crate::domain::{
    DegradationRecord, ExecutionPlan, FailureClass, FallbackAction, IntegratedReport,
    Requirement, Result, Stage, StageResult, StageStatus, Understanding,
};
use crate::health::{HealthTracker, LivenessReport};
use crate::integrator::{ResultIntegrator, SectionTaxonomy};
use crate::interpreter::{DomainLexicon, RequirementInterpreter};
use crate::metrics::METRICS;
use crate::obs::{
    emit_request_finished, emit_request_started, emit_stage_transition, request_span,
};
use crate::registry::ComponentRegistry;
use crate::selector::{self, SelectionConstraints};
use crate::validator::QualityValidator;

/// Pipeline-level state. `Completed` is the only terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Interpreting,
    Selecting,
    Executing,
    Integrating,
    Validating,
    Completed,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Interpreting => "interpreting",
            PipelineState::Selecting => "selecting",
            PipelineState::Executing => "executing",
            PipelineState::Integrating => "integrating",
            PipelineState::Validating => "validating",
            PipelineState::Completed => "completed",
        }
    }

    /// The state after this one; `Completed` stays put.
    pub fn next(self) -> Self {
        match self {
            PipelineState::Interpreting => PipelineState::Selecting,
            PipelineState::Selecting => PipelineState::Executing,
            PipelineState::Executing => PipelineState::Integrating,
            PipelineState::Integrating => PipelineState::Validating,
            PipelineState::Validating | PipelineState::Completed => PipelineState::Completed,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == PipelineState::Completed
    }

    /// Stage a state drives, if any.
    pub fn stage(self) -> Option<Stage> {
        match self {
            PipelineState::Interpreting => Some(Stage::Interpret),
            PipelineState::Selecting => Some(Stage::Select),
            PipelineState::Executing => Some(Stage::Execute),
            PipelineState::Integrating => Some(Stage::Integrate),
            PipelineState::Validating => Some(Stage::Validate),
            PipelineState::Completed => None,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpret + select output, without running anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanPreview {
    pub understanding: Understanding,
    pub plan: ExecutionPlan,
}

/// Requirement-analysis orchestrator. Cheap to share behind an `Arc`; every
/// request gets its own degradation state.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: Arc<ComponentRegistry>,
    config: PipelineConfig,
    interpreter: RequirementInterpreter,
    coordinator: ExecutionCoordinator,
    integrator: ResultIntegrator,
    validator: QualityValidator,
    health: Arc<HealthTracker>,
}

impl Pipeline {
    /// Pipeline with a lexicon built from the registry's tags and the
    /// default section taxonomy. A built-in generic fallback is re-armed
    /// with `config.generic_fallback_confidence`.
    pub fn new(registry: Arc<ComponentRegistry>, config: PipelineConfig) -> Self {
        let registry = match registry.builtin_fallback_confidence() {
            Some(c) if c != config.generic_fallback_confidence => Arc::new(
                registry
                    .as_ref()
                    .clone()
                    .with_generic_confidence(config.generic_fallback_confidence),
            ),
            _ => registry,
        };
        let health = Arc::new(HealthTracker::new());
        Self {
            interpreter: RequirementInterpreter::new(DomainLexicon::from_registry(
                &registry,
                &BTreeMap::new(),
            )),
            coordinator: ExecutionCoordinator::new(
                Arc::clone(&registry),
                Arc::clone(&health),
                config.generic_fallback_confidence,
            ),
            integrator: ResultIntegrator::new(
                Arc::clone(&registry),
                SectionTaxonomy::default(),
                config.similarity_threshold,
            ),
            validator: QualityValidator::new(config.min_confidence),
            registry,
            config,
            health,
        }
    }

    /// Add keyword synonyms per capability tag.
    pub fn with_lexicon(mut self, extra: &BTreeMap<String, Vec<String>>) -> Self {
        self.interpreter =
            RequirementInterpreter::new(DomainLexicon::from_registry(&self.registry, extra));
        self
    }

    pub fn with_taxonomy(mut self, taxonomy: SectionTaxonomy) -> Self {
        self.integrator = ResultIntegrator::new(
            Arc::clone(&self.registry),
            taxonomy,
            self.config.similarity_threshold,
        );
        self
    }

    /// Build registry and pipeline from a loaded config file.
    pub fn from_config(config: &ReqflowConfig) -> Result<Self> {
        config.pipeline.validate()?;
        let registry = Arc::new(config.build_registry()?);
        Ok(Self::new(registry, config.pipeline.clone())
            .with_lexicon(&config.lexicon)
            .with_taxonomy(SectionTaxonomy::new(config.taxonomy.clone())))
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Registry size plus last-known health of every component.
    pub fn liveness(&self) -> LivenessReport {
        METRICS.flush();
        self.health.liveness(&self.registry)
    }

    /// Interpret and select without executing.
    pub fn plan(&self, requirement: &Requirement) -> PlanPreview {
        let understanding = self
            .interpreter
            .interpret(requirement)
            .unwrap_or_else(|_| Understanding::degraded(requirement));
        let plan = selector::select(&understanding, &self.registry, self.constraints(None));
        PlanPreview {
            understanding,
            plan,
        }
    }

    /// The single entry point: analyze `text` with caller `context`.
    pub async fn analyze(
        &self,
        text: impl Into<String>,
        context: BTreeMap<String, String>,
    ) -> IntegratedReport {
        self.analyze_requirement(Requirement::new(text).with_context(context))
            .await
    }

    /// Analyze a fully built requirement. Never fails; degradation is
    /// reported through the report's `status` and `degradations`.
    pub async fn analyze_requirement(&self, requirement: Requirement) -> IntegratedReport {
        let request_id = Uuid::new_v4().to_string();
        let span = request_span(&request_id);
        self.run(request_id, requirement).instrument(span).await
    }

    async fn run(&self, request_id: String, requirement: Requirement) -> IntegratedReport {
        let started = Instant::now();
        let digest = requirement.digest().unwrap_or_else(|e| {
            warn!(error = %e, "could not digest requirement");
            String::new()
        });
        METRICS.inc_requests();
        emit_request_started(&request_id, &digest, requirement.raw_text.len());

        let manager = Arc::new(DegradationManager::new(FallbackLimits::from(&self.config)));
        let mut pipeline_records: Vec<DegradationRecord> = Vec::new();
        let mut state = PipelineState::Interpreting;
        emit_stage_transition(&request_id, state.as_str());

        let understanding = match self.interpreter.interpret(&requirement) {
            Ok(understanding) => understanding,
            Err(e) => {
                let detail = e.to_string();
                let resolution = manager.resolve(
                    FailureClass::InterpretationFailure,
                    FailureContext::stage(Stage::Interpret).with_detail(&detail),
                );
                pipeline_records.push(resolution.record);
                Understanding::degraded(&requirement)
            }
        };

        state = advance(state, &request_id);
        let plan = selector::select(&understanding, &self.registry, self.constraints(None));
        let substitution = plan.fallback_substituted.then(|| {
            let detail = format!("no component matched hints {:?}", understanding.domain_hints);
            manager.resolve(
                FailureClass::NoMatchingComponent,
                FailureContext::stage(Stage::Select).with_detail(&detail),
            )
        });

        state = advance(state, &request_id);
        let requirement = Arc::new(requirement);
        let results = match &substitution {
            Some(Resolution {
                action: FallbackAction::Abort,
                record,
            }) => vec![StageResult::failed(
                self.registry.fallback_id(),
                Duration::ZERO,
                record.clone(),
            )],
            Some(Resolution { record, .. }) => self
                .coordinator
                .execute(&plan, Arc::clone(&requirement), Arc::clone(&manager))
                .await
                .into_iter()
                .map(|r| self.mark_substituted(r, record))
                .collect(),
            None => {
                self.coordinator
                    .execute(&plan, Arc::clone(&requirement), Arc::clone(&manager))
                    .await
            }
        };

        state = advance(state, &request_id);
        let report = self.integrator.integrate(&results, &understanding, &manager);

        state = advance(state, &request_id);
        let report = self
            .validator
            .validate(report, &understanding, &manager, |weak| {
                self.rerun_weak_area(weak, &requirement, &understanding, &manager, &results)
            })
            .await;

        let mut report = report;
        report.request_id = request_id.clone();
        report.requirement_digest = digest;
        if !pipeline_records.is_empty() {
            pipeline_records.append(&mut report.degradations);
            report.degradations = pipeline_records;
        }
        if understanding.degraded {
            report.mark_degraded();
        }
        report.fallback_trail = manager.trail();
        report.processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        report.completed_at = Utc::now();

        state = advance(state, &request_id);
        debug_assert!(state.is_terminal());
        emit_request_finished(
            &request_id,
            report.status,
            report.aggregate_confidence,
            report.degradations.len(),
            report.processing_time_ms,
        );
        report
    }

    /// The one validator-triggered re-run: re-interpret the weak questions,
    /// re-select, execute as round 1 and re-integrate with the prior results.
    async fn rerun_weak_area(
        &self,
        weak: Vec<String>,
        requirement: &Arc<Requirement>,
        understanding: &Understanding,
        manager: &Arc<DegradationManager>,
        prior: &[StageResult],
    ) -> Option<IntegratedReport> {
        let focused = requirement.focused_on(&weak.join("\n"));
        let mut focus = self
            .interpreter
            .interpret(&focused)
            .unwrap_or_else(|_| understanding.clone());
        if focus.domain_hints.is_empty() {
            focus.domain_hints = understanding.domain_hints.clone();
        }
        focus.preferred_components = understanding.preferred_components.clone();

        let deadline = self.config.validator_retry_deadline();
        let plan = selector::select(&focus, &self.registry, self.constraints(Some(deadline)));
        if plan.fallback_substituted {
            debug!("weak area matches no component; nothing to re-run");
            return None;
        }

        let round = self
            .coordinator
            .execute_round(&plan, Arc::new(focused), Arc::clone(manager), 1, deadline)
            .await;
        let mut combined = prior.to_vec();
        combined.extend(round);
        Some(self.integrator.integrate(&combined, understanding, manager))
    }

    /// A fallback that stood in for "no matching component" is degraded by
    /// definition and never worth more than the generic confidence.
    fn mark_substituted(&self, result: StageResult, record: &DegradationRecord) -> StageResult {
        if result.status != StageStatus::Succeeded {
            return result;
        }
        let confidence = result
            .confidence
            .min(self.config.generic_fallback_confidence);
        let latency = Duration::from_millis(result.latency_ms);
        StageResult::degraded(
            result.component_id,
            result.payload,
            confidence,
            latency,
            record.clone(),
        )
        .in_round(result.round)
    }

    fn constraints(&self, deadline: Option<Duration>) -> SelectionConstraints {
        SelectionConstraints {
            max_components: self.config.max_components,
            max_concurrency: self.config.max_concurrency,
            global_deadline: deadline.unwrap_or_else(|| self.config.global_deadline()),
        }
    }
}

fn advance(state: PipelineState, request_id: &str) -> PipelineState {
    let next = state.next();
    emit_stage_transition(request_id, next.as_str());
    next
}
