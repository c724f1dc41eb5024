//! reqflow core library
//!
//! Requirement-analysis orchestration: interpret a free-text requirement,
//! select matching analysis components, run them concurrently under
//! timeouts, integrate their confidence-scored output into one report and
//! validate it. Every failure is absorbed by a per-request degradation
//! policy, so [`Pipeline::analyze`] always returns an [`IntegratedReport`].

pub mod components;
pub mod config;
pub mod coordinator;
pub mod degradation;
pub mod domain;
pub mod health;
pub mod integrator;
pub mod interpreter;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod registry;
pub mod reporting;
pub mod selector;
pub mod telemetry;
pub mod validator;

pub use components::{CommandComponent, FixedComponent, GenericFallbackComponent};
pub use config::{ComponentKind, ComponentSpec, PipelineConfig, ReqflowConfig};
pub use coordinator::ExecutionCoordinator;
pub use degradation::{DegradationManager, FailureContext, FallbackLimits, Resolution};
pub use domain::{
    ActionKind, AnalysisComponent, Complexity, ComponentDescriptor, ComponentError,
    ComponentOutput, DegradationRecord, ExecutionPlan, FailureClass, FallbackAction,
    IntegratedReport, ReportSection, ReportStatus, ReqflowError, Requirement, Result,
    SectionKind, Stage, StageResult, StageStatus, Understanding,
};
pub use health::{ComponentHealth, HealthState, HealthTracker, LivenessReport};
pub use integrator::{ResultIntegrator, SectionTaxonomy};
pub use interpreter::{DomainLexicon, InterpretError, RequirementInterpreter};
pub use metrics::METRICS;
pub use obs::{
    emit_component_finished, emit_degradation_applied, emit_request_finished,
    emit_request_started, emit_stage_transition, emit_validator_retry, RequestSpan,
};
pub use pipeline::{Pipeline, PipelineState, PlanPreview};
pub use registry::{ComponentRegistry, RegisteredComponent, RegistryBuilder, GENERIC_FALLBACK_ID};
pub use reporting::{render_report_md, write_report_json};
pub use selector::{rank_components, select, select_excluding, ScoredComponent, SelectionConstraints};
pub use telemetry::init_tracing;
pub use validator::{Assessment, QualityValidator};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
