//! Generic fallback component.

use async_trait::async_trait;

use crate::domain::{AnalysisComponent, ComponentError, ComponentOutput, Requirement};

/// Answers any requirement with a minimal, low-confidence summary.
#[derive(Debug, Clone)]
pub struct GenericFallbackComponent {
    confidence: f64,
}

impl GenericFallbackComponent {
    pub fn new(confidence: f64) -> Self {
        Self { confidence }
    }
}

impl Default for GenericFallbackComponent {
    fn default() -> Self {
        Self::new(0.3)
    }
}

#[async_trait]
impl AnalysisComponent for GenericFallbackComponent {
    async fn execute(&self, requirement: &Requirement) -> Result<ComponentOutput, ComponentError> {
        let text = requirement.raw_text.trim();
        let summary = if text.is_empty() {
            "No requirement text was supplied; no specific analysis is available.".to_string()
        } else {
            format!("General assessment without a specialised analysis: {text}")
        };
        Ok(ComponentOutput::new(
            serde_json::json!({ "summary": summary }),
            self.confidence,
        ))
    }
}
