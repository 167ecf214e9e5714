//! Model registry
//!
//! Resolves pipeline stages to backends, honoring per-stage overrides, and
//! tracks which backends a run actually used.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::{Model, ModelDefinition};

/// Registry setup and resolution errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Two backends registered under one name
    #[error("Duplicate model name \"{0}\"")]
    DuplicateModel(String),

    /// A stage resolved to a name with no backend
    #[error("Unknown model \"{model}\" for stage \"{stage}\"")]
    UnknownModel { stage: String, model: String },

    /// A stage was overridden twice
    #[error("Duplicate override for stage \"{0}\"")]
    DuplicateOverride(String),

    /// An override names a backend that is not registered
    #[error("Override for stage \"{stage}\" names unknown model \"{model}\"")]
    UnknownOverrideModel { stage: String, model: String },
}

/// Registered backends with stage overrides and usage tracking
#[derive(Default)]
pub struct AvailableModels {
    models: Vec<Arc<dyn Model>>,
    by_name: HashMap<String, usize>,
    overrides: HashMap<String, String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl AvailableModels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from backends, rejecting duplicate names
    pub fn from_models<M>(models: M) -> Result<Self, RegistryError>
    where
        M: IntoIterator<Item = Arc<dyn Model>>,
    {
        let mut registry = Self::new();
        for model in models {
            registry.register(model)?;
        }
        Ok(registry)
    }

    /// Register a backend
    pub fn register(&mut self, model: Arc<dyn Model>) -> Result<(), RegistryError> {
        let name = model.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateModel(name));
        }

        tracing::debug!(model = %name, kind = model.spec().kind(), "Registered model");
        self.by_name.insert(name, self.models.len());
        self.models.push(model);
        Ok(())
    }

    /// Route a stage to a specific backend instead of its default
    pub fn override_stage_model(
        &mut self,
        stage: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let stage = stage.into();
        let model = model.into();

        if self.overrides.contains_key(&stage) {
            return Err(RegistryError::DuplicateOverride(stage));
        }
        if !self.by_name.contains_key(&model) {
            return Err(RegistryError::UnknownOverrideModel { stage, model });
        }

        tracing::debug!(%stage, %model, "Stage override");
        self.overrides.insert(stage, model);
        Ok(())
    }

    /// Apply a batch of stage overrides
    pub fn apply_overrides<O>(&mut self, overrides: O) -> Result<(), RegistryError>
    where
        O: IntoIterator<Item = (String, String)>,
    {
        for (stage, model) in overrides {
            self.override_stage_model(stage, model)?;
        }
        Ok(())
    }

    /// Backend for a stage: the override if one exists, else the stage's default
    pub fn resolve(&self, stage: &str, default: &str) -> Result<Arc<dyn Model>, RegistryError> {
        let name = self
            .overrides
            .get(stage)
            .map(String::as_str)
            .unwrap_or(default);

        self.get(name).ok_or_else(|| RegistryError::UnknownModel {
            stage: stage.to_string(),
            model: name.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Model>> {
        self.by_name.get(name).map(|&i| Arc::clone(&self.models[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Record a completion request against a backend
    pub fn mark_used(&self, name: &str) {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        *calls.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn used(&self, name: &str) -> bool {
        self.call_count(name) > 0
    }

    pub fn call_count(&self, name: &str) -> usize {
        let calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        calls.get(name).copied().unwrap_or(0)
    }

    /// All backends, in registration order
    pub fn models(&self) -> impl Iterator<Item = &Arc<dyn Model>> {
        self.models.iter()
    }

    pub fn overrides(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    /// Definitions of the backends used so far, in registration order
    pub fn manifest(&self) -> Vec<ModelDefinition> {
        self.models
            .iter()
            .filter(|model| self.used(model.name()))
            .map(|model| model.spec())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl std::fmt::Debug for AvailableModels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailableModels")
            .field(
                "models",
                &self.models.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("overrides", &self.overrides)
            .finish()
    }
}
