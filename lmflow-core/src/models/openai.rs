//! OpenAI chat completions backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    Conversation, MessageRole, Model, ModelDefinition, ModelError, ModelResult, OpenAIConfig,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI backend (GPT-4o, GPT-4 Turbo, and compatible APIs)
pub struct OpenAIModel {
    client: reqwest::Client,
    name: String,
    config: OpenAIConfig,
    api_key: String,
    organization: Option<String>,
}

impl OpenAIModel {
    /// Create a new OpenAI backend.
    ///
    /// # Arguments
    ///
    /// * `name` - Registry name of this model
    /// * `config` - Remote model and sampling settings
    /// * `api_key` - OpenAI API key
    pub fn new(name: impl Into<String>, config: OpenAIConfig, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            name: name.into(),
            config,
            api_key: api_key.into(),
            organization: None,
        }
    }

    /// Create from environment variables.
    ///
    /// Reads from:
    /// - `OPENAI_API_KEY` - API key (required)
    /// - `OPENAI_ORGANIZATION` - Organization id (optional)
    /// - `OPENAI_BASE_URL` - Base URL, used when the config sets none (optional)
    ///
    /// # Errors
    ///
    /// Returns an error if OPENAI_API_KEY is not set.
    pub fn from_env(name: impl Into<String>, mut config: OpenAIConfig) -> ModelResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            ModelError::Configuration("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        if config.base_url.is_none() {
            config.base_url = std::env::var("OPENAI_BASE_URL").ok();
        }

        let mut model = Self::new(name, config, api_key);
        model.organization = std::env::var("OPENAI_ORGANIZATION").ok();
        Ok(model)
    }

    /// Remote model identifier
    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }
}

/// Chat completions request body, shared with the Azure backend
#[derive(Serialize)]
pub(super) struct OpenAIRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub messages: Vec<OpenAIMessage<'a>>,
    pub max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Serialize)]
pub(super) struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: Option<OpenAIMessageResponse>,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Deserialize)]
struct OpenAIErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

pub(super) fn convert_messages(conversation: &Conversation) -> Vec<OpenAIMessage<'_>> {
    conversation
        .messages()
        .iter()
        .map(|m| OpenAIMessage {
            role: match m.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            },
            content: &m.content,
        })
        .collect()
}

/// Send a chat completions request and extract the first completion
pub(super) async fn send_chat_request(
    builder: reqwest::RequestBuilder,
    request: &OpenAIRequest<'_>,
    provider: &str,
    name: &str,
) -> ModelResult<String> {
    let response = builder
        .header("Content-Type", "application/json")
        .json(request)
        .send()
        .await
        .map_err(|e| ModelError::Request(format!("Failed to send request to {}: {}", provider, e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        if let Ok(error) = serde_json::from_str::<OpenAIError>(&text) {
            return Err(ModelError::Api {
                status: error.error.error_type.unwrap_or_else(|| status.to_string()),
                message: error.error.message,
            });
        }

        return Err(ModelError::Api {
            status: status.to_string(),
            message: text,
        });
    }

    let chat: OpenAIResponse = response.json().await.map_err(|e| {
        ModelError::Request(format!("Failed to parse {} response: {}", provider, e))
    })?;

    chat.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| {
            ModelError::EmptyResponse(format!("{} returned no completion for {}", provider, name))
        })
}

#[async_trait]
impl Model for OpenAIModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, conversation: &Conversation) -> ModelResult<String> {
        let request = OpenAIRequest {
            model: Some(&self.config.model),
            messages: convert_messages(conversation),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url());

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key));
        if let Some(organization) = &self.organization {
            builder = builder.header("OpenAI-Organization", organization);
        }

        send_chat_request(builder, &request, "OpenAI", &self.name).await
    }

    fn spec(&self) -> ModelDefinition {
        ModelDefinition::OpenAI {
            name: self.name.clone(),
            config: self.config.clone(),
        }
    }
}

impl std::fmt::Debug for OpenAIModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIModel")
            .field("name", &self.name)
            .field("model", &self.config.model)
            .field("base_url", &self.base_url())
            .finish()
    }
}
