//! Output vocabulary: `IntegratedReport`, `ReportSection`, `SectionKind`,
//! `ReportStatus`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::degradation::DegradationRecord;
use crate::domain::requirement::Complexity;
use crate::domain::result::StageResult;

/// Fixed section taxonomy, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Summary,
    Detail,
    Risks,
    Recommendations,
    Caveats,
}

impl SectionKind {
    pub const ALL: [SectionKind; 5] = [
        SectionKind::Summary,
        SectionKind::Detail,
        SectionKind::Risks,
        SectionKind::Recommendations,
        SectionKind::Caveats,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectionKind::Summary => "summary",
            SectionKind::Detail => "detail",
            SectionKind::Risks => "risks",
            SectionKind::Recommendations => "recommendations",
            SectionKind::Caveats => "caveats",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One block of integrated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub name: String,
    pub kind: SectionKind,
    pub content: String,
    pub source_components: Vec<String>,
    pub confidence: f64,
}

/// Overall outcome visible to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Ok,
    Degraded,
    Failed,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReportStatus::Ok => "ok",
            ReportStatus::Degraded => "degraded",
            ReportStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Final pipeline output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratedReport {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub requirement_digest: String,
    pub status: ReportStatus,
    pub sections: Vec<ReportSection>,
    pub aggregate_confidence: f64,
    pub degradations: Vec<DegradationRecord>,
    /// Every degradation-policy decision, in the order it was taken.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_trail: Vec<DegradationRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caveats: Vec<String>,
    pub key_questions: Vec<String>,
    pub complexity: Complexity,
    #[serde(default)]
    pub validator_retried: bool,
    #[serde(default)]
    pub duplicates_removed: usize,
    #[serde(default)]
    pub results: Vec<StageResult>,
    pub processing_time_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl IntegratedReport {
    /// Section names in report order.
    pub fn section_names(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name.as_str()).collect()
    }

    /// Downgrade `ok` to `degraded`; `failed` is left alone.
    pub fn mark_degraded(&mut self) {
        if self.status == ReportStatus::Ok {
            self.status = ReportStatus::Degraded;
        }
    }
}
