//! Kane CI - builds a LambdaTest test run and triggers a Kane AI job.
//!
//! The main entry point for the `kane-ci` binary.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use kane_ci::observability::init_logging;
use kane_ci::{Cli, Config};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = cli.config();
    init_logging(config.log_format);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "!!! orchestration failed !!!");
            if let Some(body) = err
                .downcast_ref::<kane_ci::Error>()
                .and_then(kane_ci::Error::response_body)
            {
                tracing::error!(body, "provider response");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<()> {
    tracing::debug!(?config, "starting orchestration");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(kane_ci::stages::orchestrate(config))?;
    tracing::info!("orchestration complete");
    Ok(())
}
