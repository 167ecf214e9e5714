//! Model and override files
//!
//! Model files hold a list of [`ModelDefinition`]s; override files map stage
//! names to registered model names. Both may be YAML or JSON.

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::{
    AzureModel, FunctionModels, MockModel, Model, ModelDefinition, ModelError, ModelResult,
    OpenAIModel,
};

/// Instantiate a backend from its definition
pub fn create_model(
    definition: ModelDefinition,
    functions: &FunctionModels,
) -> ModelResult<Arc<dyn Model>> {
    match definition {
        ModelDefinition::Function { name } => functions
            .get(&name)
            .ok_or(ModelError::UnknownFunction(name)),
        ModelDefinition::Mock { name, config } => Ok(Arc::new(MockModel::new(name, config))),
        ModelDefinition::OpenAI { name, config } => {
            Ok(Arc::new(OpenAIModel::from_env(name, config)?))
        }
        ModelDefinition::Azure { name, config } => {
            Ok(Arc::new(AzureModel::from_env(name, config)?))
        }
    }
}

/// Load every backend defined in a model file
pub fn load_model_file(
    path: impl AsRef<Path>,
    functions: &FunctionModels,
) -> ModelResult<Vec<Arc<dyn Model>>> {
    let path = path.as_ref();
    let definitions: Vec<ModelDefinition> = read_definitions(path)?;

    tracing::info!(path = %path.display(), count = definitions.len(), "Loading models");

    definitions
        .into_iter()
        .map(|definition| {
            create_model(definition, functions).map_err(|e| ModelError::Definition {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        })
        .collect()
}

/// Load a stage-to-model override map
pub fn load_overrides(path: impl AsRef<Path>) -> ModelResult<BTreeMap<String, String>> {
    let path = path.as_ref();
    let overrides: BTreeMap<String, String> = read_definitions(path)?;
    tracing::info!(path = %path.display(), count = overrides.len(), "Loading model overrides");
    Ok(overrides)
}

fn read_definitions<T: DeserializeOwned>(path: &Path) -> ModelResult<T> {
    let definition_error = |message: String| ModelError::Definition {
        path: path.to_path_buf(),
        message,
    };

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let is_json = match extension.as_deref() {
        Some("json") => true,
        Some("yaml") | Some("yml") => false,
        _ => {
            return Err(definition_error(
                "expected a .yaml, .yml or .json file".to_string(),
            ));
        }
    };

    let text = std::fs::read_to_string(path).map_err(|e| definition_error(e.to_string()))?;

    if is_json {
        serde_json::from_str(&text).map_err(|e| definition_error(e.to_string()))
    } else {
        serde_yaml::from_str(&text).map_err(|e| definition_error(e.to_string()))
    }
}
