//! Serializable model definitions

use serde::{Deserialize, Serialize};

/// Description of a model backend, as found in model files and run logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelDefinition {
    /// Deterministic in-process function
    Function { name: String },

    /// Scripted completions keyed by prompt
    Mock { name: String, config: MockConfig },

    /// OpenAI chat completions endpoint
    #[serde(rename = "openai")]
    OpenAI { name: String, config: OpenAIConfig },

    /// Azure OpenAI deployment
    Azure { name: String, config: AzureConfig },
}

impl ModelDefinition {
    pub fn name(&self) -> &str {
        match self {
            ModelDefinition::Function { name }
            | ModelDefinition::Mock { name, .. }
            | ModelDefinition::OpenAI { name, .. }
            | ModelDefinition::Azure { name, .. } => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ModelDefinition::Function { .. } => "function",
            ModelDefinition::Mock { .. } => "mock",
            ModelDefinition::OpenAI { .. } => "openai",
            ModelDefinition::Azure { .. } => "azure",
        }
    }
}

/// Configuration for a mock backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockConfig {
    /// Require the prompt to equal a cached prompt exactly
    #[serde(default)]
    pub exact_match: bool,

    /// Completion returned when no cached prompt matches
    #[serde(default)]
    pub default_response: String,

    /// Scripted prompt/completion pairs
    ///
    /// Exact lookups use the last entry for a repeated prompt. Substring
    /// lookups return the first entry that matches.
    #[serde(default)]
    pub cache: Vec<CachedCompletion>,

    /// Simulated latency in milliseconds
    #[serde(default, skip_serializing_if = "is_zero")]
    pub latency_ms: u64,
}

/// A scripted prompt and its completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCompletion {
    pub prompt: String,
    pub completion: String,
}

/// Configuration for the OpenAI backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAIConfig {
    /// Remote model identifier, e.g. `gpt-4o`
    pub model: String,

    /// Completion token limit
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Base URL for OpenAI-compatible APIs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Configuration for an Azure OpenAI deployment
///
/// The deployment itself is named by the `AZURE_OPENAI_ENDPOINT` URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureConfig {
    #[serde(default = "default_max_tokens", alias = "max_tokens")]
    pub max_tokens: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn default_max_tokens() -> usize {
    256
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}
