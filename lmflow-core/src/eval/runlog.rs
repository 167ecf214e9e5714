//! Run logs
//!
//! A run log records who ran what, the backends that were actually used, and
//! one entry per test case holding either its execution trace or its error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::config::RunLogFormat;
use crate::error::Result;
use crate::models::ModelDefinition;
use crate::process::{ExecutionTrace, ProcessError};
use crate::testcase::TestCase;

/// Provenance of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub test_run_id: String,
    /// Command line that started the run
    pub cmd: String,
    /// Working directory of the run
    pub cwd: String,
    pub timestamp: DateTime<Utc>,
    pub user: String,
}

impl RunMetadata {
    /// Capture metadata from the current process
    pub fn capture() -> Self {
        let cmd = std::env::args().collect::<Vec<_>>().join(" ");
        let cwd = std::env::current_dir()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default();
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            test_run_id: Uuid::new_v4().to_string(),
            cmd,
            cwd,
            timestamp: Utc::now(),
            user,
        }
    }
}

/// Outcome of one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseLog {
    pub test_case_id: String,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<ExecutionTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaseLog {
    pub fn success(case: &TestCase, trace: ExecutionTrace) -> Self {
        Self {
            test_case_id: case.test_case_id.clone(),
            sha256: case.sha256.clone(),
            log: Some(trace),
            error: None,
        }
    }

    pub fn failure(case: &TestCase, error: &ProcessError) -> Self {
        Self {
            test_case_id: case.test_case_id.clone(),
            sha256: case.sha256.clone(),
            log: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Counters over a run log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cases: usize,
    pub failed: usize,
    /// Judgments recorded across all traces
    pub judgments: usize,
    /// Judgments equal to `true`
    pub passed: usize,
}

/// Record of an evaluation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLog {
    #[serde(flatten)]
    pub metadata: RunMetadata,
    /// Definitions of the backends used, in registration order
    pub models: Vec<ModelDefinition>,
    /// One entry per test case, in load order
    pub cases: Vec<CaseLog>,
}

impl RunLog {
    pub fn new(metadata: RunMetadata, models: Vec<ModelDefinition>, cases: Vec<CaseLog>) -> Self {
        Self {
            metadata,
            models,
            cases,
        }
    }

    pub fn test_run_id(&self) -> &str {
        &self.metadata.test_run_id
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            cases: self.cases.len(),
            ..Default::default()
        };
        for case in &self.cases {
            if case.is_failure() {
                summary.failed += 1;
            }
            if let Some(trace) = &case.log {
                for judgment in trace.judgments() {
                    summary.judgments += 1;
                    if judgment.as_bool() == Some(true) {
                        summary.passed += 1;
                    }
                }
            }
        }
        summary
    }

    pub fn to_string(&self, format: RunLogFormat) -> Result<String> {
        Ok(match format {
            RunLogFormat::Yaml => serde_yaml::to_string(self)?,
            RunLogFormat::Json => serde_json::to_string_pretty(self)?,
        })
    }

    /// Write the log, creating the output folder if needed
    pub fn write(&self, path: &Path, format: RunLogFormat) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_string(format)?)?;
        tracing::info!(path = %path.display(), cases = self.cases.len(), "Run log written");
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        Ok(if is_json {
            serde_json::from_str(&text)?
        } else {
            serde_yaml::from_str(&text)?
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ModelTrace;
    use crate::testcase::ExpectedNode;
    use serde_json::json;

    fn case(id: &str) -> TestCase {
        TestCase {
            test_case_id: id.to_string(),
            sha256: "00".to_string(),
            tags: Vec::new(),
            input: json!("hello world"),
            expected: ExpectedNode::model("wordcount"),
        }
    }

    fn trace(judgment: Option<bool>) -> ExecutionTrace {
        ExecutionTrace::Model(ModelTrace {
            model: "wordcount".to_string(),
            name: "wordcount".to_string(),
            input: json!("hello world"),
            prompt: "hello world".to_string(),
            completion: "2".to_string(),
            output: json!(2),
            expected: judgment.map(|_| json!(2)),
            judgment: judgment.map(Into::into),
        })
    }

    fn run_log() -> RunLog {
        let mut metadata = RunMetadata::capture();
        metadata.test_run_id = "run".to_string();
        RunLog::new(
            metadata,
            vec![ModelDefinition::Function {
                name: "echo".to_string(),
            }],
            vec![
                CaseLog::success(&case("a"), trace(Some(true))),
                CaseLog::success(&case("b"), trace(Some(false))),
                CaseLog::success(&case("c"), trace(None)),
                CaseLog::failure(&case("d"), &ProcessError::Cancelled),
            ],
        )
    }

    #[test]
    fn test_metadata_capture() {
        let metadata = RunMetadata::capture();
        assert!(Uuid::parse_str(&metadata.test_run_id).is_ok());
        assert!(!metadata.cwd.is_empty());
    }

    #[test]
    fn test_summary() {
        assert_eq!(
            run_log().summary(),
            RunSummary {
                cases: 4,
                failed: 1,
                judgments: 2,
                passed: 1
            }
        );
    }

    #[test]
    fn test_serialized_field_names() {
        let value = serde_json::to_value(run_log()).unwrap();
        let object = value.as_object().unwrap();
        for field in ["testRunId", "cmd", "cwd", "timestamp", "user", "models", "cases"] {
            assert!(object.contains_key(field), "missing {}", field);
        }

        let cases = value["cases"].as_array().unwrap();
        assert_eq!(cases[0]["testCaseId"], json!("a"));
        assert_eq!(cases[0]["log"]["judgment"], json!(true));
        assert!(cases[2]["log"].get("judgment").is_none());
        assert!(cases[3].get("log").is_none());
        assert_eq!(cases[3]["error"], json!("Processing cancelled"));
    }

    #[test]
    fn test_write_and_read_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs/run.yaml");
        let log = run_log();

        log.write(&path, RunLogFormat::Yaml).unwrap();
        let read = RunLog::read(&path).unwrap();
        assert_eq!(read, log);
    }
}
