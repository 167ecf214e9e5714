//! Model backends and the registry that resolves pipeline stages to them
//!
//! A [`Model`] turns a [`Conversation`] into a completion. Backends are
//! described by a [`ModelDefinition`] so that run logs can record exactly which
//! configuration produced each completion.

mod azure;
mod conversation;
mod definition;
mod function;
mod loader;
mod mock;
mod openai;
mod registry;

pub use azure::AzureModel;
pub use conversation::{Conversation, Message, MessageRole};
pub use definition::{
    AzureConfig, CachedCompletion, MockConfig, ModelDefinition, OpenAIConfig,
};
pub use function::{FunctionModel, FunctionModels};
pub use loader::{create_model, load_model_file, load_overrides};
pub use mock::MockModel;
pub use openai::OpenAIModel;
pub use registry::{AvailableModels, RegistryError};

use async_trait::async_trait;
use std::path::PathBuf;

/// Errors raised by model backends and model definition files
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Transport failure talking to a remote backend
    #[error("Request failed: {0}")]
    Request(String),

    /// Remote backend returned an error response
    #[error("API error ({status}): {message}")]
    Api { status: String, message: String },

    /// Backend returned a response without a completion
    #[error("Empty response: {0}")]
    EmptyResponse(String),

    /// Backend is missing required configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Model definition file is missing or invalid
    #[error("In {path}: {message}")]
    Definition { path: PathBuf, message: String },

    /// A `function` definition names no known function model
    #[error("Unknown function model \"{0}\"")]
    UnknownFunction(String),
}

/// Result type for model backends
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// A backend that produces completions
#[async_trait]
pub trait Model: Send + Sync {
    /// Unique name of this model instance
    fn name(&self) -> &str;

    /// Produce a completion for the conversation
    async fn complete(&self, conversation: &Conversation) -> ModelResult<String>;

    /// Serializable description of this backend and its configuration
    fn spec(&self) -> ModelDefinition;
}
