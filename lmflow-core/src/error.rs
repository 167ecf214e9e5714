//! Error types for lm-flow operations

use crate::link::LinkError;
use crate::models::{ModelError, RegistryError};
use crate::process::ProcessError;
use crate::testcase::{FilterError, LoadError};

/// Result type for lm-flow operations
pub type Result<T> = std::result::Result<T, LmFlowError>;

/// Error types for the lm-flow harness
#[derive(Debug, thiserror::Error)]
pub enum LmFlowError {
    /// Model registry setup or resolution failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Model definition or backend error
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Pipeline construction is invalid
    #[error("Malformed pipeline: {0}")]
    Pipeline(#[from] LinkError),

    /// Test case loading or validation failed
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Tag filter expression is invalid
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// A test case failed and the run was aborted
    #[error("Test case \"{test_case_id}\" failed: {source}")]
    CaseFailed {
        test_case_id: String,
        #[source]
        source: ProcessError,
    },

    /// The run was cancelled before every test case finished
    #[error("Evaluation cancelled before all test cases finished")]
    Cancelled,

    /// Processing error outside of a suite run
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
