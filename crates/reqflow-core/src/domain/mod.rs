//! Domain models for reqflow.
//!
//! Canonical definitions for the request-scoped entities:
//! - `Requirement`: immutable incoming request
//! - `Understanding`: interpreted requirement
//! - `ComponentDescriptor` / `AnalysisComponent`: registered capabilities
//! - `ExecutionPlan` / `StageResult`: what ran and how it ended
//! - `IntegratedReport`: the caller-visible answer
//! - `DegradationRecord`: audit of every fallback

pub mod component;
pub mod degradation;
pub mod error;
pub mod report;
pub mod requirement;
pub mod result;

// Re-export main types and errors
pub use component::{AnalysisComponent, ComponentDescriptor, ComponentOutput};
pub use degradation::{ActionKind, DegradationRecord, FailureClass, FallbackAction, Stage};
pub use error::{ComponentError, ReqflowError, Result};
pub use report::{IntegratedReport, ReportSection, ReportStatus, SectionKind};
pub use requirement::{Complexity, Requirement, Understanding};
pub use result::{clamp_confidence, ExecutionPlan, StageResult, StageStatus};
