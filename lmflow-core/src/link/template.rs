//! Prompt templates
//!
//! `{{input}}` is replaced by the input (strings verbatim, anything else as
//! JSON) and `{{input.field.sub}}` by a nested field. The rendered text is
//! split into turns on `[system]`, `[user]` and `[assistant]` tags.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;

use super::{LinkError, encode};
use crate::models::Conversation;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*input((?:\.[A-Za-z0-9_]+)*)\s*\}\}").unwrap());

/// A prompt template over a model link's input
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Substitute placeholders without splitting into turns
    pub fn render_text<I: Serialize>(&self, input: &I) -> Result<String, LinkError> {
        let value = encode(input)?;

        let text = PLACEHOLDER
            .replace_all(&self.text, |caps: &Captures<'_>| {
                let path = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let found = path
                    .split('.')
                    .filter(|segment| !segment.is_empty())
                    .try_fold(&value, |current, segment| current.get(segment));
                match found {
                    Some(Value::String(text)) => text.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                }
            })
            .into_owned();
        Ok(text)
    }

    pub fn render<I: Serialize>(&self, input: &I) -> Result<Conversation, LinkError> {
        Ok(Conversation::from_tagged(&self.render_text(input)?))
    }
}
