//! Component selection.
//!
//! Ranks registry entries against an [`Understanding`] and builds an
//! [`ExecutionPlan`]. Ranking is deterministic:
//!
//! 1. preferred components first
//! 2. higher match score (`overlapping tags × priority`)
//! 3. higher priority
//! 4. lexicographically smaller id
//!
//! A descriptor is eligible when it shares at least one tag with the domain
//! hints (or was named as preferred). The designated fallback never competes
//! on tags; it only enters a plan when named as preferred or when nothing
//! else is eligible, in which case it is substituted so a plan is never empty.

use std::cmp::Ordering;
use std::time::Duration;

use tracing::{debug, info};

use crate::domain::{ComponentDescriptor, ExecutionPlan, Understanding};
use crate::registry::ComponentRegistry;

/// Caller-side bounds applied to a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionConstraints {
    pub max_components: usize,
    pub max_concurrency: usize,
    pub global_deadline: Duration,
}

/// A ranked candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredComponent<'a> {
    pub descriptor: &'a ComponentDescriptor,
    pub overlap: usize,
    pub score: i64,
    pub preferred: bool,
}

fn rank(a: &ScoredComponent<'_>, b: &ScoredComponent<'_>) -> Ordering {
    b.preferred
        .cmp(&a.preferred)
        .then_with(|| b.score.cmp(&a.score))
        .then_with(|| b.descriptor.priority.cmp(&a.descriptor.priority))
        .then_with(|| a.descriptor.id.cmp(&b.descriptor.id))
}

/// Eligible descriptors in rank order.
pub fn rank_components<'a>(
    understanding: &Understanding,
    registry: &'a ComponentRegistry,
) -> Vec<ScoredComponent<'a>> {
    let fallback_id = registry.fallback_id();
    let mut scored: Vec<ScoredComponent<'a>> = registry
        .descriptors()
        .filter_map(|descriptor| {
            let overlap = descriptor.overlap(&understanding.domain_hints);
            let preferred = understanding
                .preferred_components
                .iter()
                .any(|p| p == &descriptor.id);
            if !preferred && (overlap == 0 || descriptor.id == fallback_id) {
                return None;
            }
            let overlap_weight = i64::try_from(overlap).unwrap_or(i64::MAX);
            Some(ScoredComponent {
                descriptor,
                overlap,
                score: overlap_weight.saturating_mul(i64::from(descriptor.priority)),
                preferred,
            })
        })
        .collect();
    scored.sort_by(rank);
    scored
}

/// Build the execution plan for `understanding`.
pub fn select(
    understanding: &Understanding,
    registry: &ComponentRegistry,
    constraints: SelectionConstraints,
) -> ExecutionPlan {
    select_excluding(understanding, registry, constraints, &[])
}

/// Like [`select`], but never selects an id in `exclude`.
pub fn select_excluding(
    understanding: &Understanding,
    registry: &ComponentRegistry,
    constraints: SelectionConstraints,
    exclude: &[String],
) -> ExecutionPlan {
    let cap = constraints.max_components.max(1);
    let ranked: Vec<String> = rank_components(understanding, registry)
        .into_iter()
        .map(|s| s.descriptor.id.clone())
        .filter(|id| !exclude.contains(id))
        .collect();

    let max_concurrency = constraints.max_concurrency.max(1);
    let global_deadline_ms = u64::try_from(constraints.global_deadline.as_millis()).unwrap_or(u64::MAX);

    if ranked.is_empty() {
        info!(
            hints = ?understanding.domain_hints,
            fallback = registry.fallback_id(),
            "no matching component; substituting generic fallback"
        );
        return ExecutionPlan {
            component_ids: vec![registry.fallback_id().to_string()],
            alternates: Vec::new(),
            max_concurrency,
            global_deadline_ms,
            fallback_substituted: true,
        };
    }

    let split = cap.min(ranked.len());
    let (selected, alternates) = ranked.split_at(split);
    debug!(selected = ?selected, alternates = ?alternates, "plan built");

    ExecutionPlan {
        component_ids: selected.to_vec(),
        alternates: alternates.to_vec(),
        max_concurrency,
        global_deadline_ms,
        fallback_substituted: false,
    }
}
