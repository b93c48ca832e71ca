//! Model choice for one capability.
//!
//! A name the registry has never heard of is passed straight to the remote
//! provider, so newly published models work without a registry change. A
//! registered model that lacks the capability falls back to the first model
//! that has it.

use super::registry::{ModelRegistry, ModelSpec};

/// Provider that serves unregistered model names.
pub const PASSTHROUGH_PROVIDER: &str = "gemini";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionSource {
    Default,
    Requested,
    Passthrough,
    Fallback { requested: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub capability: String,
    pub source: SelectionSource,
}

impl ModelSelection {
    /// Set only when the requested model was replaced.
    pub fn note(&self) -> Option<String> {
        match &self.source {
            SelectionSource::Fallback { requested } => Some(format!(
                "Model '{requested}' cannot serve {} requests; using '{}'.",
                self.capability, self.model.name
            )),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    pub fn select(
        &self,
        requested: Option<&str>,
        capability: &str,
    ) -> Result<ModelSelection, String> {
        let requested = requested.map(str::trim).filter(|name| !name.is_empty());
        let selection = |model: ModelSpec, source: SelectionSource| ModelSelection {
            model,
            capability: capability.to_string(),
            source,
        };

        if let Some(name) = requested {
            match self.registry.get(name) {
                None => {
                    let model = ModelSpec {
                        name: name.to_string(),
                        provider: PASSTHROUGH_PROVIDER.to_string(),
                        capabilities: vec![capability.to_string()],
                    };
                    return Ok(selection(model, SelectionSource::Passthrough));
                }
                Some(model) if model.supports(capability) => {
                    return Ok(selection(model.clone(), SelectionSource::Requested));
                }
                Some(_) => {}
            }
        }

        let model = self
            .registry
            .by_capability(capability)
            .into_iter()
            .next()
            .ok_or_else(|| format!("no registered model serves {capability} requests"))?;
        let source = match requested {
            Some(name) => SelectionSource::Fallback {
                requested: name.to_string(),
            },
            None => SelectionSource::Default,
        };
        Ok(selection(model, source))
    }
}
