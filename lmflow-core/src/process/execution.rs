//! Processing errors and execution traces

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::link::LinkKind;
use crate::models::{ModelError, RegistryError};

/// Errors raised while processing a pipeline against a test case
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The test case does not mirror the pipeline at this node
    #[error("Shape mismatch at {path}: expected {expected}, found {found}")]
    ShapeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    /// A model link's input could not be rendered
    #[error("Node \"{node}\" could not render its input: {message}")]
    Render { node: String, message: String },

    /// A model link could not parse its completion
    #[error("Node \"{node}\" could not parse completion {completion:?}: {message}")]
    OutputParse {
        node: String,
        completion: String,
        message: String,
    },

    /// A judge failed
    #[error("Judge at {path} failed: {message}")]
    Judge { path: String, message: String },

    /// A mux's distribute or combine hook failed
    #[error("Mux at {path} failed: {message}")]
    Mux { path: String, message: String },

    /// The link tree is structurally invalid
    #[error("Malformed pipeline at {path}: {message}")]
    MalformedPipeline { path: String, message: String },

    /// Stage resolved to no registered backend
    #[error(transparent)]
    UnknownModel(#[from] RegistryError),

    /// A backend did not answer in time
    #[error("Model \"{model}\" for node \"{node}\" timed out after {timeout:?}")]
    BackendTimeout {
        node: String,
        model: String,
        timeout: Duration,
    },

    /// A backend failed
    #[error("Model \"{model}\" for node \"{node}\" failed: {source}")]
    Backend {
        node: String,
        model: String,
        #[source]
        source: ModelError,
    },

    /// The run was cancelled
    #[error("Processing cancelled")]
    Cancelled,
}

impl ProcessError {
    /// Failures of the environment rather than of the pipeline or test case
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProcessError::BackendTimeout { .. }
                | ProcessError::Backend { .. }
                | ProcessError::Cancelled
        )
    }
}

/// Result type for processing
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

/// Record of one node's execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExecutionTrace {
    Model(ModelTrace),
    Sequence(SequenceTrace),
    Mux(MuxTrace),
}

/// Trace of a model link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTrace {
    /// Backend that produced the completion
    pub model: String,
    /// Link name
    pub name: String,
    pub input: Value,
    /// Flattened conversation sent to the backend
    pub prompt: String,
    pub completion: String,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judgment: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceTrace {
    pub input: Value,
    pub left: Box<ExecutionTrace>,
    pub right: Box<ExecutionTrace>,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judgment: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuxTrace {
    pub input: Value,
    /// Child traces, in task order
    pub children: Vec<ExecutionTrace>,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judgment: Option<Value>,
}

impl ExecutionTrace {
    pub fn kind(&self) -> LinkKind {
        match self {
            ExecutionTrace::Model(_) => LinkKind::Model,
            ExecutionTrace::Sequence(_) => LinkKind::Sequence,
            ExecutionTrace::Mux(_) => LinkKind::Mux,
        }
    }

    pub fn input(&self) -> &Value {
        match self {
            ExecutionTrace::Model(t) => &t.input,
            ExecutionTrace::Sequence(t) => &t.input,
            ExecutionTrace::Mux(t) => &t.input,
        }
    }

    pub fn output(&self) -> &Value {
        match self {
            ExecutionTrace::Model(t) => &t.output,
            ExecutionTrace::Sequence(t) => &t.output,
            ExecutionTrace::Mux(t) => &t.output,
        }
    }

    pub fn into_output(self) -> Value {
        match self {
            ExecutionTrace::Model(t) => t.output,
            ExecutionTrace::Sequence(t) => t.output,
            ExecutionTrace::Mux(t) => t.output,
        }
    }

    pub fn judgment(&self) -> Option<&Value> {
        match self {
            ExecutionTrace::Model(t) => t.judgment.as_ref(),
            ExecutionTrace::Sequence(t) => t.judgment.as_ref(),
            ExecutionTrace::Mux(t) => t.judgment.as_ref(),
        }
    }

    /// Every judgment in the tree, depth first
    pub fn judgments(&self) -> Vec<&Value> {
        let mut judgments = Vec::new();
        self.collect_judgments(&mut judgments);
        judgments
    }

    fn collect_judgments<'a>(&'a self, judgments: &mut Vec<&'a Value>) {
        match self {
            ExecutionTrace::Model(_) => {}
            ExecutionTrace::Sequence(t) => {
                t.left.collect_judgments(judgments);
                t.right.collect_judgments(judgments);
            }
            ExecutionTrace::Mux(t) => {
                for child in &t.children {
                    child.collect_judgments(judgments);
                }
            }
        }
        if let Some(judgment) = self.judgment() {
            judgments.push(judgment);
        }
    }
}
