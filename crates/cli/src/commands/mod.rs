//! CLI Commands

pub mod baseline;
pub mod matrix;
pub mod run;

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sitediff_common::{BrowserKind, RunConfig};
use sitediff_runner::{BrowserService, PlaywrightConfig, PlaywrightService};

/// Flags shared by the commands that capture pages
#[derive(Args, Debug, Default)]
pub struct CaptureArgs {
    /// Output directory for screenshots, records and the report
    #[arg(short, long, env = "SITEDIFF_OUTPUT_DIR")]
    pub output: Option<PathBuf>,

    /// Number of (page, viewport) targets processed concurrently
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Browser engine (chromium, firefox, webkit)
    #[arg(long, env = "SITEDIFF_BROWSER")]
    pub browser: Option<BrowserKind>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Per-pixel color threshold for perceptual comparison (0.0 - 1.0)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Differing pixels tolerated by perceptual comparison
    #[arg(long)]
    pub max_diff_pixels: Option<u64>,

    /// Settle delay after navigation, in milliseconds
    #[arg(long)]
    pub settle_ms: Option<u64>,

    /// Link screenshots from the report instead of embedding them
    #[arg(long)]
    pub link_images: bool,

    /// Directory containing the `playwright` node package
    #[arg(long)]
    pub node_modules: Option<PathBuf>,
}

impl CaptureArgs {
    /// Override configuration values with the flags that were given
    pub fn apply(&self, config: &mut RunConfig) {
        if let Some(dir) = &self.output {
            config.output.dir = dir.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(browser) = self.browser {
            config.browser = browser;
        }
        if self.headed {
            config.headless = false;
        }
        if let Some(threshold) = self.threshold {
            config.comparison.threshold = threshold;
        }
        if let Some(max) = self.max_diff_pixels {
            config.comparison.max_diff_pixels = max;
        }
        if let Some(ms) = self.settle_ms {
            config.capture.settle_delay_ms = ms;
        }
        if self.link_images {
            config.output.embed_images = false;
        }
    }

    /// Start the Playwright service for the configured browser
    pub fn browser_service(&self, config: &RunConfig) -> Result<Arc<dyn BrowserService>> {
        let service = PlaywrightService::new(PlaywrightConfig {
            browser: config.browser,
            headless: config.headless,
            node_modules: self.node_modules.clone(),
            ..PlaywrightConfig::default()
        })?;
        Ok(Arc::new(service))
    }
}

/// Load the configuration file, or the built-in configuration
pub fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    let config = RunConfig::load(path);
    match path {
        Some(path) => config.with_context(|| format!("loading {}", path.display())),
        None => config.context("built-in configuration"),
    }
}
