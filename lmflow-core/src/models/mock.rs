//! Scripted backend for deterministic evaluation
//!
//! Returns cached completions keyed by prompt text, enabling offline,
//! reproducible runs of a pipeline.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{CachedCompletion, Conversation, MockConfig, Model, ModelDefinition, ModelResult};

/// A model that answers from a prompt cache
pub struct MockModel {
    name: String,
    config: MockConfig,
    exact: HashMap<String, String>,
    lowered: Vec<(String, usize)>,
    call_count: AtomicUsize,
}

impl MockModel {
    /// Create a mock from its configuration
    pub fn new(name: impl Into<String>, config: MockConfig) -> Self {
        // Later entries replace earlier ones with the same prompt
        let exact = config
            .cache
            .iter()
            .map(|entry| (entry.prompt.clone(), entry.completion.clone()))
            .collect::<HashMap<_, _>>();
        let lowered = config
            .cache
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.prompt.to_lowercase(), index))
            .collect();

        Self {
            name: name.into(),
            config,
            exact,
            lowered,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Create an exact-match mock with a default response
    pub fn exact(name: impl Into<String>, default_response: impl Into<String>) -> Self {
        Self::new(
            name,
            MockConfig {
                exact_match: true,
                default_response: default_response.into(),
                ..Default::default()
            },
        )
    }

    /// Create a substring-match mock with a default response
    pub fn inexact(name: impl Into<String>, default_response: impl Into<String>) -> Self {
        Self::new(
            name,
            MockConfig {
                exact_match: false,
                default_response: default_response.into(),
                ..Default::default()
            },
        )
    }

    /// Add a scripted completion
    pub fn with_response(self, prompt: impl Into<String>, completion: impl Into<String>) -> Self {
        let mut config = self.config;
        config.cache.push(CachedCompletion {
            prompt: prompt.into(),
            completion: completion.into(),
        });
        Self::new(self.name, config)
    }

    /// Add a simulated latency to every completion
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.config.latency_ms = latency.as_millis() as u64;
        self
    }

    /// Number of completions served
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn lookup(&self, prompt: &str) -> &str {
        let hit = if self.config.exact_match {
            self.exact.get(prompt).map(String::as_str)
        } else {
            let prompt = prompt.to_lowercase();
            self.lowered
                .iter()
                .find(|(cached, _)| prompt.contains(cached.as_str()))
                .map(|(_, index)| self.config.cache[*index].completion.as_str())
        };
        hit.unwrap_or(&self.config.default_response)
    }
}

#[async_trait]
impl Model for MockModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, conversation: &Conversation) -> ModelResult<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        let prompt = conversation.text();
        let completion = self.lookup(&prompt);
        tracing::trace!(model = %self.name, %prompt, %completion, "Mock completion");
        Ok(completion.to_string())
    }

    fn spec(&self) -> ModelDefinition {
        ModelDefinition::Mock {
            name: self.name.clone(),
            config: self.config.clone(),
        }
    }
}

impl std::fmt::Debug for MockModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockModel")
            .field("name", &self.name)
            .field("exact_match", &self.config.exact_match)
            .field("cache_size", &self.config.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exact_match_hit_and_default() {
        let model = MockModel::exact("model1", "default").with_response("hello world", "2");

        let hit = model
            .complete(&Conversation::from_prompt("hello world"))
            .await
            .unwrap();
        assert_eq!(hit, "2");

        let miss = model
            .complete(&Conversation::from_prompt("Hello world"))
            .await
            .unwrap();
        assert_eq!(miss, "default");
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_exact_duplicate_prompt_keeps_last() {
        let model = MockModel::exact("model1", "default")
            .with_response("hello", "first")
            .with_response("hello", "second");

        let completion = model
            .complete(&Conversation::from_prompt("hello"))
            .await
            .unwrap();
        assert_eq!(completion, "second");
    }

    #[tokio::test]
    async fn test_inexact_match_is_case_insensitive_substring() {
        let model = MockModel::inexact("model1", "none")
            .with_response("WORLD", "planet")
            .with_response("hello", "greeting");

        let completion = model
            .complete(&Conversation::from_prompt("Say hello to the World"))
            .await
            .unwrap();
        assert_eq!(completion, "planet");

        let miss = model
            .complete(&Conversation::from_prompt("goodbye"))
            .await
            .unwrap();
        assert_eq!(miss, "none");
    }

    #[tokio::test]
    async fn test_exact_match_uses_flattened_conversation() {
        let model = MockModel::exact("model1", "default")
            .with_response("SYSTEM: be brief\nUSER: hi", "hello");

        let conversation = Conversation::new().system("be brief").user("hi");
        assert_eq!(model.complete(&conversation).await.unwrap(), "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency() {
        let model = MockModel::exact("slow", "done").with_latency(Duration::from_millis(500));

        let start = tokio::time::Instant::now();
        model.complete(&Conversation::from_prompt("x")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[test]
    fn test_spec_round_trips_config() {
        let model = MockModel::exact("model1", "d").with_response("a", "b");
        match model.spec() {
            ModelDefinition::Mock { name, config } => {
                assert_eq!(name, "model1");
                assert_eq!(config.cache.len(), 1);
                assert!(config.exact_match);
            }
            other => panic!("unexpected definition: {:?}", other),
        }
    }
}
