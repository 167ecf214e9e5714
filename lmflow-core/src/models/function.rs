//! In-process function models
//!
//! Function models are referenced by name from model files (`type: function`)
//! and resolved through an explicit [`FunctionModels`] table.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Conversation, Model, ModelDefinition, ModelResult};

type CompleteFn = Arc<dyn Fn(&Conversation) -> String + Send + Sync>;

/// A model backed by a plain function
#[derive(Clone)]
pub struct FunctionModel {
    name: String,
    function: CompleteFn,
}

impl FunctionModel {
    pub fn new<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&Conversation) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            function: Arc::new(function),
        }
    }

    /// Returns the flattened prompt
    pub fn echo() -> Self {
        Self::new("echo", |conversation| conversation.text())
    }

    /// Returns every turn as `ROLE: content`, even a lone user turn
    pub fn hello() -> Self {
        Self::new("hello", |conversation| {
            conversation
                .messages()
                .iter()
                .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), m.content))
                .collect::<Vec<_>>()
                .join("\n")
        })
    }

    /// Reports the prompt length in characters
    pub fn length() -> Self {
        Self::new("length", |conversation| {
            format!("The prompt length is {}", conversation.text().chars().count())
        })
    }

    /// Returns the prompt reversed
    pub fn reverse() -> Self {
        Self::new("reverse", |conversation| {
            conversation.text().chars().rev().collect()
        })
    }
}

#[async_trait]
impl Model for FunctionModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, conversation: &Conversation) -> ModelResult<String> {
        Ok((self.function)(conversation))
    }

    fn spec(&self) -> ModelDefinition {
        ModelDefinition::Function {
            name: self.name.clone(),
        }
    }
}

impl std::fmt::Debug for FunctionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionModel")
            .field("name", &self.name)
            .field("function", &"<fn>")
            .finish()
    }
}

/// Table of function models available to model files
#[derive(Clone, Default)]
pub struct FunctionModels {
    models: BTreeMap<String, Arc<dyn Model>>,
}

impl FunctionModels {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding `echo`, `hello`, `length` and `reverse`
    pub fn builtin() -> Self {
        Self::new()
            .with(FunctionModel::echo())
            .with(FunctionModel::hello())
            .with(FunctionModel::length())
            .with(FunctionModel::reverse())
    }

    /// Add a model, replacing any entry with the same name
    pub fn with(mut self, model: impl Model + 'static) -> Self {
        self.insert(Arc::new(model));
        self
    }

    pub fn insert(&mut self, model: Arc<dyn Model>) {
        self.models.insert(model.name().to_string(), model);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Model>> {
        self.models.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for FunctionModels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.models.keys()).finish()
    }
}
