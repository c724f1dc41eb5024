//! Report rendering: Markdown for humans, pretty JSON for machines.

use std::fmt::Write as _;
use std::path::Path;

use crate::domain::{IntegratedReport, Result};

/// Write the report as pretty JSON.
pub fn write_report_json(path: &Path, report: &IntegratedReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Render a Markdown summary of the report.
pub fn render_report_md(report: &IntegratedReport) -> String {
    let mut out = String::new();
    out.push_str("# Requirement Analysis\n\n");
    let _ = writeln!(out, "- status: {}", report.status);
    let _ = writeln!(
        out,
        "- aggregate confidence: {:.2}",
        report.aggregate_confidence
    );
    let _ = writeln!(out, "- complexity: {}", report.complexity);
    let _ = writeln!(out, "- processing time: {} ms", report.processing_time_ms);
    if !report.request_id.is_empty() {
        let _ = writeln!(out, "- request: `{}`", report.request_id);
    }
    out.push('\n');

    if !report.key_questions.is_empty() {
        out.push_str("## Key Questions\n");
        for q in &report.key_questions {
            let _ = writeln!(out, "- {q}");
        }
        out.push('\n');
    }

    for section in &report.sections {
        let sources = if section.source_components.is_empty() {
            "none".to_string()
        } else {
            section.source_components.join(", ")
        };
        let _ = writeln!(out, "## {}", section.name);
        let _ = writeln!(
            out,
            "_sources: {sources}; confidence {:.2}_\n",
            section.confidence
        );
        let _ = writeln!(out, "{}\n", section.content.trim_end());
    }

    if !report.caveats.is_empty() {
        out.push_str("## Caveats\n");
        for c in &report.caveats {
            let _ = writeln!(out, "- {c}");
        }
        out.push('\n');
    }

    if !report.degradations.is_empty() {
        out.push_str("## Degradations\n");
        for d in &report.degradations {
            let component = d
                .component
                .as_deref()
                .map(|c| format!(" `{c}`"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "- {}{}: {} -> {}",
                d.stage, component, d.failure_class, d.action
            );
        }
    }
    out
}
