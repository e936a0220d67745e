//! sitediff Common Library
//!
//! Data model, error taxonomy, run configuration and the target matrix shared
//! by the capture runner and the command-line interface.

pub mod config;
pub mod error;
pub mod matrix;
pub mod types;

pub use config::{
    BrowserKind, CaptureSettings, ComparisonSettings, ComparisonStrategy, NormalizationAction,
    NormalizationRule, OutputSettings, RunConfig, StrategyKind,
};
pub use error::{SiteDiffError, SiteDiffResult};
pub use matrix::{Target, TargetMatrix};
pub use types::*;

/// sitediff version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
