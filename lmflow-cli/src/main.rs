//! lm-flow - evaluate the sample word-count pipeline

use anyhow::Result;
use lmflow_core::models::FunctionModels;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    lmflow_cli::run(lmflow_cli::sample::pipeline(), FunctionModels::builtin()).await
}
