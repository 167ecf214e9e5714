//! Test-suite evaluation
//!
//! The evaluator orchestrates a whole run:
//! - Loads and validates every test case against the pipeline's shape
//! - Keeps the cases whose tags satisfy the configured filter
//! - Processes them with a bounded number in flight
//! - Assembles and writes the run log
//!
//! # Example
//!
//! ```rust,no_run
//! use lmflow_core::prelude::*;
//!
//! # async fn run() -> lmflow_core::Result<()> {
//! let pipeline = Pipeline::<String, u32>::model("wordcount", "wordcount").build();
//!
//! let config = HarnessConfig::load()?;
//! let models = load_models(&config, &FunctionModels::builtin())?;
//! let evaluator = Evaluator::new(config, models)?;
//!
//! let mut diagnostics = Diagnostics::new();
//! let outcome = evaluator
//!     .evaluate(&pipeline, RunMetadata::capture(), &mut diagnostics)
//!     .await?;
//! println!("{}", outcome.path.display());
//! # Ok(())
//! # }
//! ```

mod diagnostics;
mod runlog;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use runlog::{CaseLog, RunLog, RunMetadata, RunSummary};

use futures::future::join_all;
use std::path::PathBuf;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::{FailurePolicy, HarnessConfig};
use crate::error::{LmFlowError, Result};
use crate::link::{Link, Payload, Pipeline};
use crate::models::{AvailableModels, FunctionModels, load_model_file, load_overrides};
use crate::process::{Processor, ProcessorConfig};
use crate::testcase::{TagFilter, TestCase, TestCaseValidator};
use diagnostics::pluralize;

/// Load the configured model file and apply the configured overrides
pub fn load_models(config: &HarnessConfig, functions: &FunctionModels) -> Result<AvailableModels> {
    let mut models = AvailableModels::from_models(load_model_file(&config.models_file, functions)?)?;

    if let Some(path) = &config.overrides_file {
        models.apply_overrides(load_overrides(path)?)?;
    }

    Ok(models)
}

/// Result of an evaluation run
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    pub run_log: RunLog,

    /// Where the run log was, or in a dry run would have been, written
    pub path: PathBuf,

    pub written: bool,
}

/// Runs a pipeline over a folder of test cases
pub struct Evaluator {
    config: HarnessConfig,
    models: AvailableModels,
    filter: TagFilter,
    cancel: CancellationToken,
}

impl Evaluator {
    pub fn new(config: HarnessConfig, models: AvailableModels) -> Result<Self> {
        config.validate()?;
        let filter = match &config.filter {
            Some(expression) => TagFilter::parse(expression)?,
            None => TagFilter::All,
        };

        Ok(Self {
            config,
            models,
            filter,
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn models(&self) -> &AvailableModels {
        &self.models
    }

    pub fn filter(&self) -> &TagFilter {
        &self.filter
    }

    /// Cancelling this token fails all pending backend calls
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Load the test cases for `link` that pass the tag filter, in load order
    pub fn load_test_cases(&self, link: &Link) -> Result<Vec<TestCase>> {
        let validator = TestCaseValidator::for_link(link);
        let mut cases = crate::testcase::load_test_cases(&self.config.input_folder, &validator)?;

        let loaded = cases.len();
        cases.retain(|case| self.filter.matches(case.tags.as_slice()));
        tracing::debug!(loaded, selected = cases.len(), filter = %self.filter, "Filtered test cases");

        Ok(cases)
    }

    /// Process `cases` with at most `concurrency` in flight
    ///
    /// Under [`FailurePolicy::Abort`] the first failure that is not
    /// recoverable cancels the remaining work and is returned. Every other
    /// failure is recorded in its case's log entry.
    pub async fn run_cases(&self, link: &Link, cases: &[TestCase]) -> Result<Vec<CaseLog>> {
        let cancel = self.cancel.child_token();
        let processor = Processor::with_config(
            &self.models,
            ProcessorConfig {
                model_timeout: self.config.model_timeout,
                mux_concurrency: self.config.mux_concurrency,
                cancel: cancel.clone(),
            },
        );
        let semaphore = self.config.concurrency.map(Semaphore::new);
        let abort = self.config.failure_policy == FailurePolicy::Abort;

        let runs = cases.iter().map(|case| {
            let processor = &processor;
            let semaphore = semaphore.as_ref();
            let cancel = &cancel;
            async move {
                let _permit = match semaphore {
                    Some(semaphore) => semaphore.acquire().await.ok(),
                    None => None,
                };

                tracing::debug!(test_case_id = %case.test_case_id, "Processing test case");
                let result = processor
                    .process_link(link, case.input.clone(), &case.expected)
                    .await;

                if let Err(e) = &result {
                    if abort && !e.is_recoverable() {
                        cancel.cancel();
                    }
                }
                result
            }
        });

        let results = join_all(runs).await;

        let mut logs = Vec::with_capacity(cases.len());
        for (case, result) in cases.iter().zip(results) {
            match result {
                Ok(trace) => logs.push(CaseLog::success(case, trace)),
                Err(source) if abort && !source.is_recoverable() => {
                    return Err(LmFlowError::CaseFailed {
                        test_case_id: case.test_case_id.clone(),
                        source,
                    });
                }
                Err(e) => {
                    tracing::warn!(test_case_id = %case.test_case_id, error = %e, "Test case failed");
                    logs.push(CaseLog::failure(case, &e));
                }
            }
        }

        Ok(logs)
    }

    /// Evaluate `pipeline` over the configured test cases and write the run log
    ///
    /// Each failed case is reported as an error in `diagnostics`. Cancelling
    /// [`Evaluator::cancel_token`] aborts the run and no log is written.
    pub async fn evaluate<I: Payload, O: Payload>(
        &self,
        pipeline: &Pipeline<I, O>,
        metadata: RunMetadata,
        diagnostics: &mut Diagnostics,
    ) -> Result<EvalOutcome> {
        let link = pipeline.link();
        pipeline.check()?;

        let cases = self.load_test_cases(link)?;
        diagnostics.info(format!(
            "Evaluating {} test {} from {}",
            cases.len(),
            pluralize(cases.len(), "case", "cases"),
            self.config.input_folder.display()
        ));
        if !self.filter.is_all() {
            diagnostics.info(format!("Tag filter: {}", self.filter));
        }

        let logs = self.run_cases(link, &cases).await?;
        if self.cancel.is_cancelled() {
            return Err(LmFlowError::Cancelled);
        }
        for log in &logs {
            if let Some(error) = &log.error {
                diagnostics.error(format!("Test case {} failed: {}", log.test_case_id, error));
            }
        }

        let run_log = RunLog::new(metadata, self.models.manifest(), logs);
        let summary = run_log.summary();
        diagnostics.info(format!(
            "Processed {} test {}: {} failed, {} of {} {} passed",
            summary.cases,
            pluralize(summary.cases, "case", "cases"),
            summary.failed,
            summary.passed,
            summary.judgments,
            pluralize(summary.judgments, "judgment", "judgments"),
        ));

        let path = self.config.run_log_path(run_log.test_run_id());
        let written = if self.config.dryrun {
            diagnostics.info(format!("Dry run: run log not written to {}", path.display()));
            false
        } else {
            run_log.write(&path, self.config.format)?;
            diagnostics.info(format!("Run log written to {}", path.display()));
            true
        };

        Ok(EvalOutcome {
            run_log,
            path,
            written,
        })
    }
}
