//! Component returning a configured payload.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{AnalysisComponent, ComponentError, ComponentOutput, Requirement};

/// Returns the same payload and confidence for every requirement,
/// optionally after a fixed delay.
#[derive(Debug, Clone)]
pub struct FixedComponent {
    output: ComponentOutput,
    delay: Option<Duration>,
}

impl FixedComponent {
    pub fn new(payload: serde_json::Value, confidence: f64) -> Self {
        Self {
            output: ComponentOutput::new(payload, confidence),
            delay: None,
        }
    }

    pub fn text(content: impl Into<String>, confidence: f64) -> Self {
        Self {
            output: ComponentOutput::text(content, confidence),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl AnalysisComponent for FixedComponent {
    async fn execute(&self, _requirement: &Requirement) -> Result<ComponentOutput, ComponentError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.output.clone())
    }
}
