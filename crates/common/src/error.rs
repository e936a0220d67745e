//! Error types for sitediff

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the sitediff error
pub type SiteDiffResult<T> = std::result::Result<T, SiteDiffError>;

/// sitediff error types
#[derive(Error, Debug)]
pub enum SiteDiffError {
    #[error("Navigation to {url} timed out after {timeout_ms} ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Normalization rule '{selector}' not applied: {reason}")]
    NormalizationFailure { selector: String, reason: String },

    #[error("Capture failed: {0}")]
    CaptureFailure(String),

    #[error("Comparison skipped: {0}")]
    ComparisonSkipped(String),

    #[error("Failed to write report {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Duplicate capture target: {0}")]
    DuplicateTarget(String),

    #[error("Browser automation error: {0}")]
    Browser(String),

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    BrowserNotFound,

    #[error("Baseline not found: {0}")]
    BaselineNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl SiteDiffError {
    /// Whether the error only invalidates the task it happened in.
    ///
    /// Run-level errors (output directory, report, configuration) abort the
    /// whole run instead.
    pub fn is_task_fatal(&self) -> bool {
        matches!(
            self,
            SiteDiffError::NavigationTimeout { .. }
                | SiteDiffError::Navigation { .. }
                | SiteDiffError::CaptureFailure(_)
                | SiteDiffError::ComparisonSkipped(_)
                | SiteDiffError::Browser(_)
                | SiteDiffError::Image(_)
                | SiteDiffError::BaselineNotFound(_)
        )
    }

    /// Short machine-readable kind, used in result records
    pub fn kind(&self) -> &'static str {
        match self {
            SiteDiffError::NavigationTimeout { .. } => "navigation_timeout",
            SiteDiffError::Navigation { .. } => "navigation",
            SiteDiffError::NormalizationFailure { .. } => "normalization_failure",
            SiteDiffError::CaptureFailure(_) => "capture_failure",
            SiteDiffError::ComparisonSkipped(_) => "comparison_skipped",
            SiteDiffError::ReportWrite { .. } => "report_write",
            SiteDiffError::OutputDir { .. } => "output_dir",
            SiteDiffError::InvalidConfig(_) => "invalid_config",
            SiteDiffError::DuplicateTarget(_) => "duplicate_target",
            SiteDiffError::Browser(_) | SiteDiffError::BrowserNotFound => "browser",
            SiteDiffError::BaselineNotFound(_) => "baseline_not_found",
            SiteDiffError::Io(_) => "io",
            SiteDiffError::Json(_) => "json",
            SiteDiffError::Yaml(_) => "yaml",
            SiteDiffError::Image(_) => "image",
            SiteDiffError::Url(_) => "url",
        }
    }
}
