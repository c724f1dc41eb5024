//! Quality validation.
//!
//! A report passes when every key question is addressed by at least one
//! content section and the aggregate confidence reaches the configured
//! minimum. A failing report gets exactly one re-run of the weak area; if it
//! still fails it is finalized as `degraded` with caveats.

use std::collections::BTreeSet;
use std::future::Future;

use tracing::{debug, info};

use crate::degradation::{DegradationManager, FailureContext};
use crate::domain::{
    FailureClass, FallbackAction, IntegratedReport, SectionKind, Stage, Understanding,
};
use crate::integrator::token_set;
use crate::metrics::METRICS;
use crate::obs::emit_validator_retry;

/// Words that never make a question "addressed" on their own.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "what", "how", "why", "when", "where", "which",
    "who", "should", "can", "could", "would", "does", "will", "our", "this", "that", "with",
    "from", "into", "about", "have", "has", "there", "their", "they", "you", "your", "any",
    "all", "not", "but", "its",
];

/// What the rubric found.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub unaddressed: Vec<String>,
    pub aggregate_confidence: f64,
    pub min_confidence: f64,
}

impl Assessment {
    pub fn passes(&self) -> bool {
        self.unaddressed.is_empty() && !self.below_threshold()
    }

    pub fn below_threshold(&self) -> bool {
        self.aggregate_confidence < self.min_confidence
    }

    /// Questions to re-run: the unaddressed ones, or all of them when only
    /// confidence is lacking.
    pub fn weak_questions(&self, understanding: &Understanding) -> Vec<String> {
        if self.unaddressed.is_empty() {
            understanding.key_questions.clone()
        } else {
            self.unaddressed.clone()
        }
    }

    fn caveats(&self) -> Vec<String> {
        let mut caveats: Vec<String> = self
            .unaddressed
            .iter()
            .map(|q| format!("Key question not addressed: {q}"))
            .collect();
        if self.below_threshold() {
            caveats.push(format!(
                "Aggregate confidence {:.2} is below the required {:.2}",
                self.aggregate_confidence, self.min_confidence
            ));
        }
        caveats
    }

    fn describe(&self) -> String {
        format!(
            "{} unaddressed question(s), aggregate confidence {:.2} (minimum {:.2})",
            self.unaddressed.len(),
            self.aggregate_confidence,
            self.min_confidence
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityValidator {
    min_confidence: f64,
}

impl QualityValidator {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    /// Apply the completeness rubric.
    pub fn assess(&self, report: &IntegratedReport, understanding: &Understanding) -> Assessment {
        let section_tokens: Vec<BTreeSet<String>> = report
            .sections
            .iter()
            .filter(|s| s.kind != SectionKind::Caveats)
            .map(|s| token_set(&s.content))
            .collect();

        let unaddressed = understanding
            .key_questions
            .iter()
            .filter(|q| !is_addressed(q, &section_tokens))
            .cloned()
            .collect();

        Assessment {
            unaddressed,
            aggregate_confidence: report.aggregate_confidence,
            min_confidence: self.min_confidence,
        }
    }

    /// Validate `report`, re-running the weak area at most once.
    ///
    /// `rerun` receives the weak questions and returns the re-integrated
    /// report, or `None` when nothing could be re-run.
    pub async fn validate<F, Fut>(
        &self,
        report: IntegratedReport,
        understanding: &Understanding,
        manager: &DegradationManager,
        rerun: F,
    ) -> IntegratedReport
    where
        F: FnOnce(Vec<String>) -> Fut,
        Fut: Future<Output = Option<IntegratedReport>>,
    {
        let assessment = self.assess(&report, understanding);
        if assessment.passes() {
            debug!("report passed validation");
            return report;
        }

        let detail = assessment.describe();
        let resolution = manager.resolve(
            FailureClass::QualityBelowThreshold,
            FailureContext::stage(Stage::Validate).with_detail(&detail),
        );

        let (mut report, assessment, record) = match resolution.action {
            FallbackAction::Retry => {
                let weak = assessment.weak_questions(understanding);
                METRICS.inc_validator_retries();
                emit_validator_retry(
                    &report.request_id,
                    weak.len(),
                    assessment.aggregate_confidence,
                );

                let mut report = match rerun(weak).await {
                    Some(rerun_report) => rerun_report,
                    None => report,
                };
                report.validator_retried = true;

                let after = self.assess(&report, understanding);
                if after.passes() {
                    info!("report passed validation after retry");
                    return report;
                }
                let detail = after.describe();
                let final_resolution = manager.resolve(
                    FailureClass::QualityBelowThreshold,
                    FailureContext::stage(Stage::Validate).with_detail(&detail),
                );
                (report, after, final_resolution.record)
            }
            _ => (report, assessment, resolution.record),
        };

        report.caveats.extend(assessment.caveats());
        report.degradations.push(record);
        report.mark_degraded();
        info!(
            caveats = report.caveats.len(),
            status = %report.status,
            "report finalized with caveats"
        );
        report
    }
}

fn significant_tokens(text: &str) -> BTreeSet<String> {
    token_set(text)
        .into_iter()
        .filter(|t| t.chars().count() >= 3 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn is_addressed(question: &str, sections: &[BTreeSet<String>]) -> bool {
    let wanted = significant_tokens(question);
    if wanted.is_empty() {
        return true;
    }
    sections
        .iter()
        .any(|tokens| wanted.iter().any(|w| tokens.contains(w)))
}
