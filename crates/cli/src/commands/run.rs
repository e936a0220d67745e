//! Cross-environment comparison

use anyhow::Result;
use clap::Args;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use sitediff_common::StrategyKind;
use sitediff_runner::ComparisonRunner;

use super::{load_config, CaptureArgs};
use crate::output::{self, OutputFormat};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// First environment of the comparison (defaults to the configured pair)
    #[arg(long)]
    pub env_a: Option<String>,

    /// Second environment of the comparison
    #[arg(long)]
    pub env_b: Option<String>,

    /// Comparison strategy (exact, perceptual)
    #[arg(long)]
    pub strategy: Option<StrategyKind>,

    /// Exit with status 1 when any pair differs, whatever the strategy
    #[arg(long)]
    pub fail_on_diff: bool,

    #[command(flatten)]
    pub capture: CaptureArgs,
}

pub async fn execute(
    args: RunArgs,
    config: Option<&Path>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let mut config = load_config(config)?;
    args.capture.apply(&mut config);
    if let Some(strategy) = args.strategy {
        config.comparison.strategy = strategy;
    }
    if args.env_a.is_some() || args.env_b.is_some() {
        let (a, b) = config
            .comparison_pair()
            .map(|(a, b)| (a.name.clone(), b.name.clone()))?;
        config.compare = Some((
            args.env_a.clone().unwrap_or(a),
            args.env_b.clone().unwrap_or(b),
        ));
    }
    config.validate()?;

    let browser = args.capture.browser_service(&config)?;
    let fails_on_diff = args.fail_on_diff || config.comparison.strategy == StrategyKind::Perceptual;

    let runner = ComparisonRunner::new(Arc::new(config), browser);
    let outcome = runner.run_comparison().await?;
    output::print_outcome(&outcome, format);

    if fails_on_diff && outcome.has_differences() {
        Ok(ExitCode::from(crate::EXIT_DIFFERENCES))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
