//! lm-flow CLI - Command-line tools for evaluating pipelines
//!
//! A pipeline author wraps their pipeline in the CLI with [`run`]:
//!
//! ```rust,no_run
//! use lmflow_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<std::process::ExitCode> {
//!     let pipeline = Pipeline::<String, u32>::model("wordcount", "wordcount").build();
//!     lmflow_cli::run(pipeline, FunctionModels::builtin()).await
//! }
//! ```

pub mod sample;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use figment::providers::Serialized;
use lmflow_core::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "lm-flow")]
#[command(about = "Tool to evaluate multi-LLM pipelines", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate the pipeline against its test cases
    Eval(EvalArgs),
    /// Remove run logs from the output folder
    Clean(CleanArgs),
    /// List the configured model backends
    Models(ModelArgs),
    /// Version information
    Version,
}

#[derive(Args, Debug, Default)]
pub struct EvalArgs {
    /// Maximum number of concurrent test case evaluations
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Maximum number of concurrent tasks within one mux
    #[arg(long)]
    pub mux_concurrency: Option<usize>,

    /// Evaluate without writing the run log
    #[arg(short, long)]
    pub dryrun: bool,

    /// Boolean expression of tags, e.g. "smoke & !slow"
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Folder containing test cases
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Write the run log as JSON instead of YAML
    #[arg(short, long)]
    pub json: bool,

    /// Name for the run log file (defaults to the run id)
    #[arg(short, long)]
    pub log_file: Option<String>,

    /// Folder receiving run logs
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Deadline for each backend call, e.g. "30s"
    #[arg(long)]
    pub timeout: Option<String>,

    /// Record failed test cases in the run log instead of aborting
    #[arg(long)]
    pub record_failures: bool,

    #[command(flatten)]
    pub models: ModelArgs,
}

#[derive(Args, Debug, Default)]
pub struct ModelArgs {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, env = "LMFLOW_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Model definition file
    #[arg(short, long)]
    pub models: Option<PathBuf>,

    /// Stage-to-model override file
    #[arg(long)]
    pub overrides: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct CleanArgs {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, env = "LMFLOW_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Folder holding run logs
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also remove files that are not run logs
    #[arg(short = 'x', long)]
    pub force: bool,

    /// Report what would be removed without removing it
    #[arg(short, long)]
    pub dryrun: bool,
}

/// Command-line values layered over the loaded configuration
#[derive(Debug, Default, Serialize)]
struct FlagOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    input_folder: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_folder: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    models_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overrides_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mux_concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dryrun: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<RunLogFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_policy: Option<FailurePolicy>,
}

impl From<&ModelArgs> for FlagOverrides {
    fn from(args: &ModelArgs) -> Self {
        Self {
            models_file: args.models.clone(),
            overrides_file: args.overrides.clone(),
            ..Default::default()
        }
    }
}

impl From<&EvalArgs> for FlagOverrides {
    fn from(args: &EvalArgs) -> Self {
        Self {
            input_folder: args.input.clone(),
            output_folder: args.output.clone(),
            concurrency: args.concurrency,
            mux_concurrency: args.mux_concurrency,
            filter: args.filter.clone(),
            log_file: args.log_file.clone(),
            dryrun: args.dryrun.then_some(true),
            format: args.json.then_some(RunLogFormat::Json),
            model_timeout: args.timeout.clone(),
            failure_policy: args.record_failures.then_some(FailurePolicy::Record),
            ..FlagOverrides::from(&args.models)
        }
    }
}

fn load_config(config: Option<&Path>, overrides: FlagOverrides) -> Result<HarnessConfig> {
    let figment = HarnessConfig::figment(config).merge(Serialized::defaults(overrides));
    Ok(HarnessConfig::from_figment(&figment)?)
}

/// Parse the command line and run it against `pipeline`
///
/// Prints the diagnostics summary; the exit code is a failure when any
/// error was recorded.
pub async fn run<I: Payload, O: Payload>(
    pipeline: Pipeline<I, O>,
    functions: FunctionModels,
) -> Result<ExitCode> {
    let cli = Cli::parse();
    if matches!(cli.command, Commands::Version) {
        println!("lm-flow {}", env!("CARGO_PKG_VERSION"));
        println!("lmflow-core {}", lmflow_core::VERSION);
        return Ok(ExitCode::SUCCESS);
    }

    let diagnostics = run_with(cli, &pipeline, &functions).await;
    println!("{}", diagnostics.summary());
    Ok(if diagnostics.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Run a parsed command line, collecting its diagnostics
pub async fn run_with<I: Payload, O: Payload>(
    cli: Cli,
    pipeline: &Pipeline<I, O>,
    functions: &FunctionModels,
) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();

    let result = match cli.command {
        Commands::Eval(args) => evaluate(&args, pipeline, functions, &mut diagnostics).await,
        Commands::Clean(args) => clean(&args, &mut diagnostics),
        Commands::Models(args) => list_models(&args, functions, &mut diagnostics),
        Commands::Version => Ok(()),
    };
    if let Err(e) = result {
        diagnostics.error(format!("{:#}", e));
    }

    diagnostics
}

async fn evaluate<I: Payload, O: Payload>(
    args: &EvalArgs,
    pipeline: &Pipeline<I, O>,
    functions: &FunctionModels,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    let config = load_config(args.models.config.as_deref(), FlagOverrides::from(args))?;
    let models = load_models(&config, functions).context("Failed to load models")?;
    let evaluator = Evaluator::new(config, models)?;

    let cancel = evaluator.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling pending model calls");
            cancel.cancel();
        }
    });

    let outcome = evaluator
        .evaluate(pipeline, RunMetadata::capture(), diagnostics)
        .await;
    interrupt.abort();

    let outcome = outcome?;
    tracing::debug!(path = %outcome.path.display(), written = outcome.written, "Evaluation complete");
    Ok(())
}

fn is_run_log(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext, "yaml" | "yml" | "json"))
}

fn clean(args: &CleanArgs, diagnostics: &mut Diagnostics) -> Result<()> {
    let config = load_config(
        args.config.as_deref(),
        FlagOverrides {
            output_folder: args.output.clone(),
            ..Default::default()
        },
    )?;
    let folder = &config.output_folder;

    if !folder.exists() {
        diagnostics.info(format!("Output folder {} does not exist", folder.display()));
        return Ok(());
    }

    let mut logs = Vec::new();
    let mut extras = Vec::new();
    let entries = std::fs::read_dir(folder)
        .with_context(|| format!("Failed to read output folder {}", folder.display()))?;
    for entry in entries {
        let path = entry?.path();
        if is_run_log(&path) {
            logs.push(path);
        } else {
            extras.push(path);
        }
    }
    logs.sort();
    extras.sort();

    if !extras.is_empty() {
        if !args.force {
            for extra in &extras {
                diagnostics.warning(format!("Not a run log: {}", extra.display()));
            }
            anyhow::bail!(
                "Output folder {} contains files that are not run logs, use --force to remove them",
                folder.display()
            );
        }
        logs.append(&mut extras);
    }

    if args.dryrun {
        diagnostics.info(format!(
            "Dry run: ready to remove {} entries from {}",
            logs.len(),
            folder.display()
        ));
        for path in &logs {
            diagnostics.info(format!("  {}", path.display()));
        }
        return Ok(());
    }

    for path in &logs {
        let removed = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        removed.with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    diagnostics.info(format!(
        "Removed {} entries from {}",
        logs.len(),
        folder.display()
    ));
    Ok(())
}

fn list_models(
    args: &ModelArgs,
    functions: &FunctionModels,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    let config = load_config(args.config.as_deref(), FlagOverrides::from(args))?;
    let models = load_models(&config, functions).context("Failed to load models")?;

    diagnostics.info(format!(
        "{} models defined in {}",
        models.len(),
        config.models_file.display()
    ));
    for model in models.models() {
        let definition = model.spec();
        println!("{:<20} {}", definition.name(), definition.kind());
    }

    let mut overrides: Vec<_> = models.overrides().iter().collect();
    overrides.sort();
    for (stage, model) in overrides {
        println!("{:<20} -> {}", stage, model);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_eval_flags() {
        let cli = Cli::try_parse_from([
            "lm-flow", "eval", "-c", "4", "-d", "-f", "smoke & !slow", "-i", "cases", "-j",
            "-l", "latest", "-m", "models.yaml", "-o", "runs", "--timeout", "30s",
            "--record-failures",
        ])
        .unwrap();

        let Commands::Eval(args) = cli.command else {
            panic!("expected eval");
        };
        let overrides = serde_json::to_value(FlagOverrides::from(&args)).unwrap();
        assert_eq!(
            overrides,
            serde_json::json!({
                "input_folder": "cases",
                "output_folder": "runs",
                "models_file": "models.yaml",
                "concurrency": 4,
                "filter": "smoke & !slow",
                "log_file": "latest",
                "dryrun": true,
                "format": "json",
                "model_timeout": "30s",
                "failure_policy": "record",
            })
        );
    }

    #[test]
    fn test_unset_flags_leave_config_alone() {
        let overrides = serde_json::to_value(FlagOverrides::from(&EvalArgs::default())).unwrap();
        assert_eq!(overrides, serde_json::json!({}));
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lm-flow.toml");
        std::fs::write(&path, "concurrency = 2\nmodel_timeout = \"1m\"\n").unwrap();

        let args = EvalArgs {
            timeout: Some("5s".to_string()),
            ..Default::default()
        };
        let config = load_config(Some(&path), FlagOverrides::from(&args)).unwrap();
        assert_eq!(config.concurrency, Some(2));
        assert_eq!(config.model_timeout, Some(std::time::Duration::from_secs(5)));
    }

    #[test]
    fn test_clean_refuses_unexpected_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("run.yaml"), "cases: []").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        let mut args = CleanArgs {
            output: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let mut diagnostics = Diagnostics::new();
        assert!(clean(&args, &mut diagnostics).is_err());
        assert!(dir.path().join("run.yaml").exists());
        assert_eq!(diagnostics.count(Severity::Warning), 1);

        args.force = true;
        args.dryrun = true;
        clean(&args, &mut diagnostics).unwrap();
        assert!(dir.path().join("notes.txt").exists());

        args.dryrun = false;
        clean(&args, &mut diagnostics).unwrap();
        assert!(!dir.path().join("run.yaml").exists());
        assert!(!dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_clean_removes_run_logs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), "").unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();

        let args = CleanArgs {
            output: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        clean(&args, &mut Diagnostics::new()).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_eval_command_writes_run_log() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("cases")).unwrap();
        std::fs::write(root.join("models.yaml"), sample::MODELS).unwrap();
        std::fs::write(root.join("cases/hello.yaml"), sample::CASE).unwrap();

        let cli = Cli::try_parse_from([
            "lm-flow".to_string(),
            "eval".to_string(),
            "-i".to_string(),
            root.join("cases").display().to_string(),
            "-o".to_string(),
            root.join("runs").display().to_string(),
            "-m".to_string(),
            root.join("models.yaml").display().to_string(),
            "-l".to_string(),
            "latest".to_string(),
        ])
        .unwrap();

        let diagnostics = run_with(cli, &sample::pipeline(), &FunctionModels::builtin()).await;
        assert!(!diagnostics.has_errors(), "{}", diagnostics);

        let log = RunLog::read(&root.join("runs/latest.yaml")).unwrap();
        assert_eq!(log.cases.len(), 1);
        assert_eq!(log.summary().passed, 2);
    }

    #[tokio::test]
    async fn test_timed_out_case_sets_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("cases")).unwrap();
        std::fs::write(
            root.join("models.yaml"),
            sample::MODELS.replacen("exactMatch: true", "exactMatch: true\n    latencyMs: 5000", 1),
        )
        .unwrap();
        std::fs::write(root.join("cases/hello.yaml"), sample::CASE).unwrap();

        let cli = Cli::try_parse_from([
            "lm-flow".to_string(),
            "eval".to_string(),
            "-i".to_string(),
            root.join("cases").display().to_string(),
            "-o".to_string(),
            root.join("runs").display().to_string(),
            "-m".to_string(),
            root.join("models.yaml").display().to_string(),
            "--timeout".to_string(),
            "10ms".to_string(),
        ])
        .unwrap();

        let diagnostics = run_with(cli, &sample::pipeline(), &FunctionModels::builtin()).await;
        assert!(diagnostics.has_errors(), "{}", diagnostics);
        assert!(
            diagnostics
                .messages(Severity::Error)
                .any(|m| m.contains("hello failed") && m.contains("timed out"))
        );
    }

    #[tokio::test]
    async fn test_eval_failure_sets_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "lm-flow".to_string(),
            "eval".to_string(),
            "-m".to_string(),
            dir.path().join("missing.yaml").display().to_string(),
        ])
        .unwrap();

        let diagnostics = run_with(cli, &sample::pipeline(), &FunctionModels::builtin()).await;
        assert!(diagnostics.has_errors());
        assert!(
            diagnostics
                .messages(Severity::Error)
                .any(|m| m.contains("Failed to load models"))
        );
    }
}
