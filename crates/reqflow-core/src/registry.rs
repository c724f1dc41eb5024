//! Component registry.
//!
//! The registry is built once at process start and shared read-only across
//! requests (`Arc<ComponentRegistry>`). Entries are kept in a `BTreeMap` so
//! iteration order, and therefore selection, is deterministic.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::components::GenericFallbackComponent;
use crate::domain::{AnalysisComponent, ComponentDescriptor, ReqflowError, Result};

/// Id used for the auto-registered generic fallback.
pub const GENERIC_FALLBACK_ID: &str = "generic";

/// A descriptor paired with its implementation.
#[derive(Clone)]
pub struct RegisteredComponent {
    pub descriptor: ComponentDescriptor,
    pub component: Arc<dyn AnalysisComponent>,
}

impl std::fmt::Debug for RegisteredComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredComponent")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Catalog of analysis capabilities. Always contains a generic fallback.
#[derive(Debug, Clone)]
pub struct ComponentRegistry {
    entries: BTreeMap<String, RegisteredComponent>,
    fallback_id: String,
    /// Set when the fallback is the auto-registered [`GenericFallbackComponent`].
    builtin_confidence: Option<f64>,
}

impl ComponentRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredComponent> {
        self.entries.get(id)
    }

    pub fn descriptor(&self, id: &str) -> Option<&ComponentDescriptor> {
        self.entries.get(id).map(|e| &e.descriptor)
    }

    /// Descriptors in id order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.entries.values().map(|e| &e.descriptor)
    }

    pub fn fallback_id(&self) -> &str {
        &self.fallback_id
    }

    pub fn fallback(&self) -> Option<&RegisteredComponent> {
        self.entries.get(&self.fallback_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Confidence of the built-in generic fallback, `None` when the
    /// fallback is a caller-registered component.
    pub fn builtin_fallback_confidence(&self) -> Option<f64> {
        self.builtin_confidence
    }

    /// Re-register the built-in fallback with `confidence`. Caller-registered
    /// fallbacks are left untouched.
    pub fn with_generic_confidence(mut self, confidence: f64) -> Self {
        if self.builtin_confidence.is_some() {
            self.entries
                .insert(GENERIC_FALLBACK_ID.to_string(), builtin_fallback(confidence));
            self.builtin_confidence = Some(confidence);
        }
        self
    }
}

/// Builder that validates descriptors and designates the generic fallback.
pub struct RegistryBuilder {
    entries: Vec<RegisteredComponent>,
    fallback: Option<String>,
    generic_confidence: f64,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            fallback: None,
            generic_confidence: 0.3,
        }
    }
}

impl RegistryBuilder {
    pub fn register(
        mut self,
        descriptor: ComponentDescriptor,
        component: Arc<dyn AnalysisComponent>,
    ) -> Self {
        self.entries.push(RegisteredComponent {
            descriptor,
            component,
        });
        self
    }

    /// Designate an already-registered component as the generic fallback.
    pub fn fallback(mut self, id: impl Into<String>) -> Self {
        self.fallback = Some(id.into());
        self
    }

    /// Confidence reported by the auto-registered generic fallback.
    pub fn generic_confidence(mut self, confidence: f64) -> Self {
        self.generic_confidence = confidence;
        self
    }

    /// Validate and freeze the registry.
    ///
    /// When no fallback is designated, a component with id `generic` is used
    /// if present; otherwise a [`GenericFallbackComponent`] is registered
    /// under that id.
    pub fn build(self) -> Result<ComponentRegistry> {
        let mut entries = BTreeMap::new();
        for entry in self.entries {
            entry.descriptor.validate()?;
            let id = entry.descriptor.id.clone();
            if entries.insert(id.clone(), entry).is_some() {
                return Err(ReqflowError::DuplicateComponent(id));
            }
        }

        let mut builtin_confidence = None;
        let fallback_id = match self.fallback {
            Some(id) => {
                if !entries.contains_key(&id) {
                    return Err(ReqflowError::UnknownComponent(id));
                }
                id
            }
            None => {
                if !entries.contains_key(GENERIC_FALLBACK_ID) {
                    debug!("registering built-in generic fallback component");
                    entries.insert(
                        GENERIC_FALLBACK_ID.to_string(),
                        builtin_fallback(self.generic_confidence),
                    );
                    builtin_confidence = Some(self.generic_confidence);
                }
                GENERIC_FALLBACK_ID.to_string()
            }
        };

        Ok(ComponentRegistry {
            entries,
            fallback_id,
            builtin_confidence,
        })
    }
}

fn builtin_fallback(confidence: f64) -> RegisteredComponent {
    RegisteredComponent {
        descriptor: ComponentDescriptor::new(GENERIC_FALLBACK_ID, [GENERIC_FALLBACK_ID])
            .with_priority(0)
            .with_timeout(Duration::from_secs(1))
            .with_trust_weight(confidence.clamp(0.0, 1.0)),
        component: Arc::new(GenericFallbackComponent::new(confidence)),
    }
}
