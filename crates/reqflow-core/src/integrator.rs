//! Result integration.
//!
//! Payloads become report sections:
//!
//! - an object whose keys name section kinds (`summary`, `risks`, ...) feeds
//!   each of those sections directly;
//! - anything else is rendered to text and filed under the kind derived from
//!   the source component's capability tags via [`SectionTaxonomy`].
//!
//! Near-identical sections (token-set Jaccard similarity at or above the
//! configured threshold) are collapsed, keeping the higher-confidence copy.
//! Aggregate confidence is the trust-weighted mean of usable results, never
//! above the best single result.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::degradation::{DegradationManager, FailureContext};
use crate::domain::{
    clamp_confidence, FailureClass, IntegratedReport, ReportSection, ReportStatus, SectionKind,
    Stage, StageResult, StageStatus, Understanding,
};
use crate::interpreter::normalize;
use crate::registry::ComponentRegistry;

/// Capability tag -> section kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionTaxonomy {
    overrides: BTreeMap<String, SectionKind>,
}

impl SectionTaxonomy {
    pub fn new(overrides: BTreeMap<String, SectionKind>) -> Self {
        let overrides = overrides
            .into_iter()
            .map(|(tag, kind)| (tag.to_lowercase(), kind))
            .collect();
        Self { overrides }
    }

    pub fn kind_for_tag(&self, tag: &str) -> SectionKind {
        let tag = tag.to_lowercase();
        if let Some(kind) = self.overrides.get(&tag) {
            return *kind;
        }
        match tag.as_str() {
            "summary" | "overview" => SectionKind::Summary,
            "risk" | "risks" | "security" | "compliance" => SectionKind::Risks,
            "recommendation" | "recommendations" | "planning" | "strategy" => {
                SectionKind::Recommendations
            }
            "caveat" | "caveats" => SectionKind::Caveats,
            _ => SectionKind::Detail,
        }
    }

    /// First specific kind among `tags` in report order, else `Detail`.
    pub fn kind_for<'a>(&self, tags: impl IntoIterator<Item = &'a String>) -> SectionKind {
        tags.into_iter()
            .map(|t| self.kind_for_tag(t))
            .filter(|k| *k != SectionKind::Detail)
            .min()
            .unwrap_or(SectionKind::Detail)
    }
}

/// Merges stage results into an [`IntegratedReport`].
#[derive(Debug, Clone)]
pub struct ResultIntegrator {
    registry: Arc<ComponentRegistry>,
    taxonomy: SectionTaxonomy,
    similarity_threshold: f64,
}

impl ResultIntegrator {
    pub fn new(
        registry: Arc<ComponentRegistry>,
        taxonomy: SectionTaxonomy,
        similarity_threshold: f64,
    ) -> Self {
        Self {
            registry,
            taxonomy,
            similarity_threshold,
        }
    }

    /// Build the report for `results`.
    ///
    /// `request_id`, `requirement_digest` and `processing_time_ms` are left
    /// for the pipeline to stamp.
    pub fn integrate(
        &self,
        results: &[StageResult],
        understanding: &Understanding,
        manager: &DegradationManager,
    ) -> IntegratedReport {
        let status = overall_status(results);

        let mut candidates: Vec<ReportSection> = results
            .iter()
            .filter(|r| r.is_usable())
            .flat_map(|r| self.sections_for(r))
            .collect();
        candidates.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));

        let (mut sections, duplicates_removed) = self.deduplicate(candidates, manager);

        let aggregate_confidence = if status == ReportStatus::Failed {
            0.0
        } else {
            self.aggregate_confidence(results)
        };

        if sections.is_empty() || status == ReportStatus::Failed {
            sections = vec![minimal_section(status)];
        }

        let degradations = results
            .iter()
            .filter(|r| r.status != StageStatus::Succeeded)
            .filter_map(|r| r.degradation.clone())
            .collect();

        debug!(
            sections = sections.len(),
            duplicates_removed,
            aggregate_confidence,
            status = %status,
            "results integrated"
        );

        IntegratedReport {
            request_id: String::new(),
            requirement_digest: String::new(),
            status,
            sections,
            aggregate_confidence,
            degradations,
            fallback_trail: Vec::new(),
            caveats: Vec::new(),
            key_questions: understanding.key_questions.clone(),
            complexity: understanding.complexity,
            validator_retried: false,
            duplicates_removed,
            results: results.to_vec(),
            processing_time_ms: 0,
            completed_at: Utc::now(),
        }
    }

    fn sections_for(&self, result: &StageResult) -> Vec<ReportSection> {
        let Some(payload) = result.payload.as_ref() else {
            return Vec::new();
        };
        let source = result.source_component();
        let default_kind = self
            .registry
            .descriptor(source)
            .map(|d| self.taxonomy.kind_for(&d.capability_tags))
            .unwrap_or(SectionKind::Detail);

        let mut by_kind: BTreeMap<SectionKind, Vec<String>> = BTreeMap::new();
        match payload {
            Value::Object(map) if map.keys().any(|k| SectionKind::parse(k).is_some()) => {
                for (key, value) in map {
                    if let Some(kind) = SectionKind::parse(key) {
                        by_kind.entry(kind).or_default().push(value_text(value));
                    }
                }
            }
            other => by_kind.entry(default_kind).or_default().push(value_text(other)),
        }

        by_kind
            .into_iter()
            .filter_map(|(kind, parts)| {
                let content = parts
                    .into_iter()
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                if content.is_empty() {
                    return None;
                }
                Some(ReportSection {
                    name: format!("{kind}/{source}"),
                    kind,
                    content,
                    source_components: vec![source.to_string()],
                    confidence: result.confidence,
                })
            })
            .collect()
    }

    fn deduplicate(
        &self,
        candidates: Vec<ReportSection>,
        manager: &DegradationManager,
    ) -> (Vec<ReportSection>, usize) {
        let mut kept: Vec<(ReportSection, BTreeSet<String>)> = Vec::new();
        let mut removed = 0usize;

        for section in candidates {
            let tokens = token_set(&section.content);
            let duplicate_of = kept
                .iter()
                .position(|(_, existing)| jaccard(existing, &tokens) >= self.similarity_threshold);
            let Some(index) = duplicate_of else {
                kept.push((section, tokens));
                continue;
            };

            removed += 1;
            let (existing, existing_tokens) = &mut kept[index];
            let mut sources: BTreeSet<String> =
                existing.source_components.iter().cloned().collect();
            sources.extend(section.source_components.iter().cloned());

            let replace = match section.confidence.partial_cmp(&existing.confidence) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Less) => false,
                _ => {
                    let detail = format!("{} duplicates {}", section.name, existing.name);
                    warn!(kept = %existing.name, dropped = %section.name, "equal-confidence duplicate sections");
                    manager.resolve(
                        FailureClass::IntegrationConflict,
                        FailureContext::stage(Stage::Integrate).with_detail(&detail),
                    );
                    false
                }
            };
            if replace {
                *existing = section;
                *existing_tokens = tokens;
            }
            existing.source_components = sources.into_iter().collect();
        }

        let mut sections: Vec<ReportSection> = kept.into_iter().map(|(s, _)| s).collect();
        sections.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
        (sections, removed)
    }

    fn aggregate_confidence(&self, results: &[StageResult]) -> f64 {
        let usable: Vec<(f64, f64)> = results
            .iter()
            .filter(|r| r.is_usable())
            .map(|r| {
                let weight = self
                    .registry
                    .descriptor(r.source_component())
                    .or_else(|| self.registry.descriptor(&r.component_id))
                    .map(|d| d.trust_weight)
                    .unwrap_or(0.0);
                (r.confidence, weight)
            })
            .collect();
        if usable.is_empty() {
            return 0.0;
        }

        let total_weight: f64 = usable.iter().map(|(_, w)| w).sum();
        let mean = if total_weight > 0.0 {
            usable.iter().map(|(c, w)| c * (w / total_weight)).sum::<f64>()
        } else {
            usable.iter().map(|(c, _)| c).sum::<f64>() / usable.len() as f64
        };
        let ceiling = usable.iter().map(|(c, _)| *c).fold(0.0, f64::max);
        clamp_confidence(mean.min(ceiling))
    }
}

/// `ok` when everything succeeded, `failed` when everything failed.
fn overall_status(results: &[StageResult]) -> ReportStatus {
    if results.is_empty() || results.iter().all(|r| r.status == StageStatus::Failed) {
        ReportStatus::Failed
    } else if results.iter().all(|r| r.status == StageStatus::Succeeded) {
        ReportStatus::Ok
    } else {
        ReportStatus::Degraded
    }
}

fn minimal_section(status: ReportStatus) -> ReportSection {
    let content = match status {
        ReportStatus::Failed => "No analysis component produced a result for this requirement.",
        _ => "No analysis component produced usable content before the deadline.",
    };
    ReportSection {
        name: format!("{}/generic", SectionKind::Summary),
        kind: SectionKind::Summary,
        content: content.to_string(),
        source_components: Vec::new(),
        confidence: 0.0,
    }
}

/// Text view of a payload value.
fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => ["content", "text", "summary"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

pub(crate) fn token_set(text: &str) -> BTreeSet<String> {
    normalize(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Token-set Jaccard similarity in 0..1.
pub(crate) fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}
