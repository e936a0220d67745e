//! sitediff CLI - Main Entry Point
//!
//! Captures the same pages in several environments and viewports, compares
//! the screenshots and reports the differences.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod output;

use commands::{baseline, matrix, run};

/// Exit code when differences were found and the mode fails on them
pub const EXIT_DIFFERENCES: u8 = 1;

/// Exit code for run-level failures (configuration, output, browser)
pub const EXIT_FAILURE: u8 = 2;

/// sitediff - visual comparison of website environments
#[derive(Parser)]
#[command(name = "sitediff")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (YAML); the built-in configuration is used when absent
    #[arg(short, long, env = "SITEDIFF_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two environments page by page and write an HTML report
    Run(run::RunArgs),

    /// Check one environment against stored perceptual baselines
    Baseline(baseline::BaselineArgs),

    /// Print the capture tasks without launching a browser
    Matrix,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Run(args) => run::execute(args, config, cli.format).await,
        Commands::Baseline(args) => baseline::execute(args, config, cli.format).await,
        Commands::Matrix => matrix::execute(config, cli.format),
        Commands::Version => {
            println!("sitediff v{}", sitediff_common::VERSION);
            println!("Multi-environment, multi-viewport visual comparison");
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "sitediff",
            "run",
            "--env-a",
            "production",
            "--env-b",
            "staging",
            "--strategy",
            "perceptual",
            "--max-diff-pixels",
            "250",
            "--link-images",
            "--format",
            "json",
        ])
        .unwrap();

        assert!(matches!(cli.format, output::OutputFormat::Json));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.env_a.as_deref(), Some("production"));
                assert_eq!(args.env_b.as_deref(), Some("staging"));
                assert_eq!(args.capture.max_diff_pixels, Some(250));
                assert!(args.capture.link_images);
                assert!(!args.fail_on_diff);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parses_baseline_flags() {
        let cli = Cli::try_parse_from([
            "sitediff",
            "baseline",
            "--only-env",
            "development",
            "--update-baselines",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Baseline(args) => {
                assert_eq!(args.only_env.as_deref(), Some("development"));
                assert!(args.update_baselines);
            }
            _ => panic!("expected baseline"),
        }
    }

    #[test]
    fn test_rejects_unknown_strategy() {
        assert!(Cli::try_parse_from(["sitediff", "run", "--strategy", "fuzzy"]).is_err());
    }
}
