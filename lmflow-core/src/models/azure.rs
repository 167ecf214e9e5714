//! Azure OpenAI backend
//!
//! Azure addresses a deployment by URL rather than by model name, so the
//! endpoint is the full chat completions URL including `api-version`, e.g.
//! `https://<resource>.openai.azure.com/openai/deployments/<deployment>/chat/completions?api-version=2024-02-01`.

use async_trait::async_trait;

use super::openai::{OpenAIRequest, convert_messages, send_chat_request};
use super::{AzureConfig, Conversation, Model, ModelDefinition, ModelError, ModelResult};

/// Azure OpenAI deployment backend
pub struct AzureModel {
    client: reqwest::Client,
    name: String,
    config: AzureConfig,
    api_key: String,
    endpoint: String,
}

impl AzureModel {
    pub fn new(
        name: impl Into<String>,
        config: AzureConfig,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            name: name.into(),
            config,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Create from `AZURE_OPENAI_API_KEY` and `AZURE_OPENAI_ENDPOINT`.
    ///
    /// # Errors
    ///
    /// Returns an error if either variable is not set.
    pub fn from_env(name: impl Into<String>, config: AzureConfig) -> ModelResult<Self> {
        let api_key = required_env("AZURE_OPENAI_API_KEY")?;
        let endpoint = required_env("AZURE_OPENAI_ENDPOINT")?;
        Ok(Self::new(name, config, api_key, endpoint))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request<'a>(&'a self, conversation: &'a Conversation) -> OpenAIRequest<'a> {
        OpenAIRequest {
            model: None,
            messages: convert_messages(conversation),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

fn required_env(key: &str) -> ModelResult<String> {
    std::env::var(key)
        .map_err(|_| ModelError::Configuration(format!("{} environment variable not set", key)))
}

#[async_trait]
impl Model for AzureModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, conversation: &Conversation) -> ModelResult<String> {
        let builder = self
            .client
            .post(&self.endpoint)
            .header("api-key", self.api_key.as_str());

        send_chat_request(builder, &self.request(conversation), "Azure OpenAI", &self.name).await
    }

    fn spec(&self) -> ModelDefinition {
        ModelDefinition::Azure {
            name: self.name.clone(),
            config: self.config.clone(),
        }
    }
}

impl std::fmt::Debug for AzureModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureModel")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
