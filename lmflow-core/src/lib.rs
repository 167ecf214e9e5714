//! # lm-flow - Composable LLM pipelines, evaluated against recorded test cases
//!
//! lm-flow builds language-model pipelines from three kinds of link:
//! - **Model** links render an input into a prompt, call a backend and parse
//!   the completion
//! - **Sequence** links feed one pipeline's output into the next
//! - **Mux** links fan an input out to a dynamic set of child tasks and
//!   combine their outputs
//!
//! A test case mirrors a pipeline's shape with the expected value of each
//! node. The processor walks both trees together, judges every node that has
//! an expected value, and records an execution trace. The evaluator runs a
//! whole folder of test cases and writes a run log.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lmflow_core::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let wordcount = Pipeline::<String, u32>::model("wordcount", "wordcount")
//!         .judge(|observed: &u32, expected: &u32| observed == expected)
//!         .build();
//!
//!     let models = AvailableModels::from_models(vec![Arc::new(
//!         MockModel::exact("wordcount", "0").with_response("hello world", "2"),
//!     ) as Arc<dyn Model>])?;
//!
//!     let expected = ExpectedNode::model("wordcount").expect(2);
//!     let trace = process(&models, &wordcount, &"hello world".to_string(), &expected).await?;
//!     assert_eq!(trace.judgment(), Some(&serde_json::json!(true)));
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **link**: the pipeline tree and its typed builders
//! - **process**: the recursive processor and execution traces
//! - **testcase**: test-case shapes, validation, loading and tag filters
//! - **models**: the `Model` trait, backends and the model registry
//! - **eval**: suite evaluation, run logs and diagnostics
//! - **config**: layered harness configuration

pub mod config;
pub mod error;
pub mod eval;
pub mod link;
pub mod models;
pub mod process;
pub mod testcase;

pub use error::{LmFlowError, Result};

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{FailurePolicy, HarnessConfig, RunLogFormat};
    pub use crate::error::{LmFlowError, Result};
    pub use crate::eval::{
        CaseLog, Diagnostics, EvalOutcome, Evaluator, RunLog, RunMetadata, RunSummary, Severity,
        load_models,
    };
    pub use crate::link::{
        Link, LinkError, LinkKind, MuxTask, Payload, Pipeline, PromptTemplate, decode, encode,
    };
    pub use crate::models::{
        AvailableModels, AzureConfig, AzureModel, Conversation, FunctionModel, FunctionModels,
        Message, MessageRole, MockConfig, MockModel, Model, ModelDefinition, ModelError,
        OpenAIConfig, OpenAIModel, RegistryError, load_model_file, load_overrides,
    };
    pub use crate::process::{
        ExecutionTrace, ProcessError, Processor, ProcessorConfig, process,
    };
    pub use crate::testcase::{
        ExpectedNode, TagFilter, TestCase, TestCaseValidator, ValidationError, load_test_cases,
    };
}
