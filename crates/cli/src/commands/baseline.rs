//! Perceptual baseline check of a single environment

use anyhow::Result;
use clap::Args;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use sitediff_runner::ComparisonRunner;

use super::{load_config, CaptureArgs};
use crate::output::{self, OutputFormat};

#[derive(Args, Debug)]
pub struct BaselineArgs {
    /// Environment to check (defaults to the first configured one)
    #[arg(long)]
    pub only_env: Option<String>,

    /// Replace existing baselines with the new captures
    #[arg(long)]
    pub update_baselines: bool,

    #[command(flatten)]
    pub capture: CaptureArgs,
}

/// Any difference or failed capture exits with status 1
pub async fn execute(
    args: BaselineArgs,
    config: Option<&Path>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let mut config = load_config(config)?;
    args.capture.apply(&mut config);
    config.validate()?;

    let browser = args.capture.browser_service(&config)?;
    let runner = ComparisonRunner::new(Arc::new(config), browser);
    let outcome = runner
        .run_baseline(args.only_env.as_deref(), args.update_baselines)
        .await?;
    output::print_outcome(&outcome, format);

    if outcome.has_differences() || outcome.has_errors() {
        Ok(ExitCode::from(crate::EXIT_DIFFERENCES))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
