//! Configuration for evaluation runs
//!
//! Values are layered, later layers winning:
//!
//! 1. Built-in defaults for any field left unset
//! 2. `lm-flow.toml` and `lm-flow.yaml` in the working directory
//! 3. The file named by `LMFLOW_CONFIG_PATH`
//! 4. `INPUT_FOLDER`, `OUTPUT_FOLDER` and `MODEL_DEFINITION`
//! 5. `LMFLOW_*` variables, e.g. `LMFLOW_CONCURRENCY=4`
//!
//! Command-line flags are applied on top by the CLI.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LmFlowError, Result};

/// What to do when a test case fails with a pipeline or test case error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the run and write no log
    #[default]
    Abort,
    /// Record the error in the case's log entry and continue
    Record,
}

/// Run log serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunLogFormat {
    #[default]
    Yaml,
    Json,
}

impl RunLogFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RunLogFormat::Yaml => "yaml",
            RunLogFormat::Json => "json",
        }
    }
}

/// Evaluation run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Folder holding test case files
    pub input_folder: PathBuf,

    /// Folder receiving run logs
    pub output_folder: PathBuf,

    /// Model definition file
    pub models_file: PathBuf,

    /// Optional stage-to-model override file
    pub overrides_file: Option<PathBuf>,

    /// Maximum test cases in flight (unbounded when absent)
    pub concurrency: Option<usize>,

    /// Maximum concurrent tasks within one mux (unbounded when absent)
    pub mux_concurrency: Option<usize>,

    /// Tag filter expression
    pub filter: Option<String>,

    /// Run log file name (defaults to the run id)
    pub log_file: Option<String>,

    /// Evaluate without writing a run log
    pub dryrun: bool,

    /// Run log format
    pub format: RunLogFormat,

    /// Deadline for each backend call
    #[serde(with = "humantime_serde")]
    pub model_timeout: Option<Duration>,

    pub failure_policy: FailurePolicy,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            input_folder: PathBuf::from("./data/cases"),
            output_folder: PathBuf::from("./data/runs"),
            models_file: PathBuf::from("./data/models.yaml"),
            overrides_file: None,
            concurrency: None,
            mux_concurrency: None,
            filter: None,
            log_file: None,
            dryrun: false,
            format: RunLogFormat::Yaml,
            model_timeout: None,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from files and the environment
    pub fn load() -> Result<Self> {
        Self::from_figment(&Self::figment(None))
    }

    /// Configuration layers, with `config_path` standing in for `LMFLOW_CONFIG_PATH`
    pub fn figment(config_path: Option<&Path>) -> figment::Figment {
        use figment::{
            Figment,
            providers::{Env, Format, Toml, Yaml},
        };

        let mut figment = Figment::new()
            .merge(Toml::file("lm-flow.toml"))
            .merge(Yaml::file("lm-flow.yaml"));

        // Check for custom config path
        match config_path {
            Some(path) => figment = merge_file(figment, path),
            None => {
                if let Ok(path) = std::env::var("LMFLOW_CONFIG_PATH") {
                    figment = merge_file(figment, Path::new(&path));
                }
            }
        }

        figment
            .merge(Env::raw().only(&["input_folder", "output_folder"]))
            .merge(
                Env::raw()
                    .only(&["model_definition"])
                    .map(|_| "models_file".into()),
            )
            .merge(Env::prefixed("LMFLOW_"))
    }

    /// Extract and validate configuration from prepared layers
    pub fn from_figment(figment: &figment::Figment) -> Result<Self> {
        let config: HarnessConfig = figment.extract().map_err(|e| {
            LmFlowError::Configuration(format!("Failed to load configuration: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a single TOML, YAML or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        use figment::Figment;

        let path = path.as_ref();
        let config: HarnessConfig = merge_file(Figment::new(), path).extract().map_err(|e| {
            LmFlowError::Configuration(format!(
                "Failed to load configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject limits that would stall a run
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == Some(0) {
            return Err(LmFlowError::Configuration(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.mux_concurrency == Some(0) {
            return Err(LmFlowError::Configuration(
                "mux_concurrency must be at least 1".to_string(),
            ));
        }
        if self.model_timeout == Some(Duration::ZERO) {
            return Err(LmFlowError::Configuration(
                "model_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Path the run log is written to
    pub fn run_log_path(&self, test_run_id: &str) -> PathBuf {
        let extension = self.format.extension();
        let file = match &self.log_file {
            Some(name) => {
                let has_extension = Path::new(name)
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| matches!(ext, "yaml" | "yml" | "json"));
                if has_extension {
                    name.clone()
                } else {
                    format!("{}.{}", name, extension)
                }
            }
            None => format!("{}.{}", test_run_id, extension),
        };
        self.output_folder.join(file)
    }
}

fn merge_file(figment: figment::Figment, path: &Path) -> figment::Figment {
    use figment::providers::{Format, Json, Toml, Yaml};

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => figment.merge(Toml::file(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.input_folder, PathBuf::from("./data/cases"));
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lm-flow.toml");
        std::fs::write(
            &path,
            r#"
input_folder = "cases"
concurrency = 4
model_timeout = "30s"
failure_policy = "record"
format = "json"
"#,
        )
        .unwrap();

        let config = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(config.input_folder, PathBuf::from("cases"));
        assert_eq!(config.output_folder, PathBuf::from("./data/runs"));
        assert_eq!(config.concurrency, Some(4));
        assert_eq!(config.model_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.failure_policy, FailurePolicy::Record);
        assert_eq!(config.format, RunLogFormat::Json);
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lm-flow.yaml");
        std::fs::write(&path, "filter: smoke & !slow\ndryrun: true\n").unwrap();

        let config = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(config.filter.as_deref(), Some("smoke & !slow"));
        assert!(config.dryrun);
    }

    #[test]
    fn test_later_layers_win() {
        use figment::providers::Serialized;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "model_timeout: 30s\nconcurrency: 2\n").unwrap();

        let figment = HarnessConfig::figment(Some(&path)).merge(Serialized::defaults(
            serde_json::json!({ "model_timeout": "2s" }),
        ));
        let config = HarnessConfig::from_figment(&figment).unwrap();
        assert_eq!(config.model_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.concurrency, Some(2));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = HarnessConfig {
            concurrency: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LmFlowError::Configuration(_))
        ));
    }

    #[test]
    fn test_run_log_path() {
        let mut config = HarnessConfig {
            output_folder: PathBuf::from("runs"),
            ..Default::default()
        };
        assert_eq!(config.run_log_path("abc"), PathBuf::from("runs/abc.yaml"));

        config.log_file = Some("latest".to_string());
        config.format = RunLogFormat::Json;
        assert_eq!(config.run_log_path("abc"), PathBuf::from("runs/latest.json"));

        config.log_file = Some("latest.yaml".to_string());
        assert_eq!(config.run_log_path("abc"), PathBuf::from("runs/latest.yaml"));
    }
}
