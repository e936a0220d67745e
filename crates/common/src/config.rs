//! Run configuration
//!
//! The configuration is a static YAML document listing environments,
//! viewport profiles, page paths, page normalization rules and comparison
//! defaults. It is loaded once, validated, and then shared immutably by every
//! capture task of the run.
//!
//! ```yaml
//! environments:
//!   - name: production
//!     base_url: https://www.example.com
//!   - name: development
//!     base_url: https://dev.example.com
//! compare: [production, development]
//! viewports:
//!   - { name: desktop, width: 1920, height: 1080 }
//!   - { name: mobile, width: 375, height: 667 }
//! pages:
//!   - /
//!   - /communities/eagle/
//! normalization:
//!   - { selector: "#cookie-notice", action: hide }
//!   - { selector: "form [required]", action: fill, value: "test" }
//! comparison:
//!   strategy: perceptual
//!   threshold: 0.1
//!   max_diff_pixels: 1000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::{SiteDiffError, SiteDiffResult};
use crate::types::{Environment, PageTarget, ViewportProfile};

/// Default navigation timeout (network idle), milliseconds
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;

/// Default settle delay after navigation, milliseconds
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2_500;

/// Default per-pixel color difference threshold for perceptual comparison
pub const DEFAULT_THRESHOLD: f64 = 0.1;

/// Default number of differing pixels tolerated by perceptual comparison
pub const DEFAULT_MAX_DIFF_PIXELS: u64 = 1000;

/// Default output directory
pub const DEFAULT_OUTPUT_DIR: &str = "screenshots";

/// Default number of targets processed concurrently
pub const DEFAULT_WORKERS: usize = 4;

/// Placeholder written into required form fields
pub const DEFAULT_FILL_VALUE: &str = "test";

/// Complete configuration of a comparison run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Environment registry, in display order
    pub environments: Vec<Environment>,

    /// The two environments compared against each other (A, B)
    pub compare: Option<(String, String)>,

    /// Viewport profiles, in display order
    pub viewports: Vec<ViewportProfile>,

    /// Site-relative page paths, in display order
    pub pages: Vec<PageTarget>,

    /// Capture timing and screenshot options
    pub capture: CaptureSettings,

    /// Rules applied to every page before capture
    pub normalization: Vec<NormalizationRule>,

    /// Comparison strategy and tolerances
    pub comparison: ComparisonSettings,

    /// Where artifacts are written
    pub output: OutputSettings,

    /// Browser engine driven by the automation service
    pub browser: BrowserKind,

    /// Run the browser headless
    pub headless: bool,

    /// Number of (page, viewport) targets processed concurrently
    pub workers: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            environments: default_environments(),
            compare: None,
            viewports: vec![
                ViewportProfile::new("desktop", 1920, 1080),
                ViewportProfile::new("tablet", 768, 1024),
                ViewportProfile::new("mobile", 375, 667),
            ],
            pages: ["/", "/communities/", "/communities/eagle/", "/contact/"]
                .iter()
                .filter_map(|p| PageTarget::new(*p).ok())
                .collect(),
            capture: CaptureSettings::default(),
            normalization: default_normalization_rules(),
            comparison: ComparisonSettings::default(),
            output: OutputSettings::default(),
            browser: BrowserKind::default(),
            headless: true,
            workers: DEFAULT_WORKERS,
        }
    }
}

fn default_environments() -> Vec<Environment> {
    [
        ("production", "https://www.example.com"),
        ("development", "https://dev.example.com"),
    ]
    .iter()
    .filter_map(|(name, url)| Environment::new(*name, url).ok())
    .collect()
}

/// Hide the cookie banner and fill required form fields
pub fn default_normalization_rules() -> Vec<NormalizationRule> {
    vec![
        NormalizationRule {
            selector: "#cookie-notice, #cookie-law-info-bar, .cookie-banner".to_string(),
            action: NormalizationAction::Hide,
        },
        NormalizationRule {
            selector: "form [required]".to_string(),
            action: NormalizationAction::Fill {
                value: DEFAULT_FILL_VALUE.to_string(),
            },
        },
    ]
}

impl RunConfig {
    /// Parse a configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> SiteDiffResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a YAML file
    pub fn from_file(path: &Path) -> SiteDiffResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SiteDiffError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&content)?;
        debug!(
            "Loaded {}: {} environment(s), {} viewport(s), {} page(s)",
            path.display(),
            config.environments.len(),
            config.viewports.len(),
            config.pages.len()
        );
        Ok(config)
    }

    /// Load from a file when given, otherwise use the built-in configuration
    pub fn load(path: Option<&Path>) -> SiteDiffResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Check the structural constraints of the configuration
    pub fn validate(&self) -> SiteDiffResult<()> {
        if self.environments.is_empty() {
            return Err(SiteDiffError::InvalidConfig(
                "at least one environment is required".to_string(),
            ));
        }
        check_names("environment", self.environments.iter().map(|e| e.name.as_str()))?;

        if self.viewports.is_empty() {
            return Err(SiteDiffError::InvalidConfig(
                "at least one viewport profile is required".to_string(),
            ));
        }
        for viewport in &self.viewports {
            if viewport.width == 0 || viewport.height == 0 {
                return Err(SiteDiffError::InvalidConfig(format!(
                    "viewport '{}' must have positive dimensions, got {}x{}",
                    viewport.name, viewport.width, viewport.height
                )));
            }
        }
        check_names("viewport", self.viewports.iter().map(|v| v.name.as_str()))?;
        if self.viewports.iter().any(|v| v.name == RESERVED_VIEWPORT_NAME) {
            return Err(SiteDiffError::InvalidConfig(format!(
                "viewport name '{}' is reserved for comparison report files",
                RESERVED_VIEWPORT_NAME
            )));
        }

        if self.pages.is_empty() {
            return Err(SiteDiffError::InvalidConfig(
                "at least one page path is required".to_string(),
            ));
        }
        check_unique("page", self.pages.iter().map(|p| p.path()))?;

        if let Some((a, b)) = &self.compare {
            if a == b {
                return Err(SiteDiffError::InvalidConfig(format!(
                    "cannot compare environment '{}' with itself",
                    a
                )));
            }
            for name in [a, b] {
                if self.environment(name).is_none() {
                    return Err(SiteDiffError::InvalidConfig(format!(
                        "compared environment '{}' is not defined",
                        name
                    )));
                }
            }
        }

        let threshold = self.comparison.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SiteDiffError::InvalidConfig(format!(
                "comparison threshold must be within 0.0..=1.0, got {}",
                threshold
            )));
        }
        if self.workers == 0 {
            return Err(SiteDiffError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.capture.navigation_timeout_ms == 0 {
            return Err(SiteDiffError::InvalidConfig(
                "navigation timeout must be positive".to_string(),
            ));
        }
        for rule in &self.normalization {
            if rule.selector.trim().is_empty() {
                return Err(SiteDiffError::InvalidConfig(
                    "normalization rule with empty selector".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Look up an environment by name
    pub fn environment(&self, name: &str) -> Option<&Environment> {
        self.environments.iter().find(|e| e.name == name)
    }

    /// The (A, B) environments to compare: the explicit pair, or the first
    /// two registered environments.
    pub fn comparison_pair(&self) -> SiteDiffResult<(&Environment, &Environment)> {
        let (a, b) = match &self.compare {
            Some((a, b)) => (a.as_str(), b.as_str()),
            None => match self.environments.as_slice() {
                [first, second, ..] => (first.name.as_str(), second.name.as_str()),
                _ => {
                    return Err(SiteDiffError::InvalidConfig(
                        "comparison requires at least two environments".to_string(),
                    ))
                }
            },
        };
        let lookup = |name: &str| {
            self.environment(name).ok_or_else(|| {
                SiteDiffError::InvalidConfig(format!("environment '{}' is not defined", name))
            })
        };
        Ok((lookup(a)?, lookup(b)?))
    }
}

/// Baseline files named after this viewport would shadow the `report-`
/// prefixed files of a comparison run in the same directory.
const RESERVED_VIEWPORT_NAME: &str = "report";

/// Environment and viewport names are restricted to `[A-Za-z0-9_]` so that
/// `{viewport}-{page_id}-{environment}` splits unambiguously.
fn check_names<'a>(what: &str, names: impl Iterator<Item = &'a str>) -> SiteDiffResult<()> {
    let names: Vec<&str> = names.collect();
    for name in &names {
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(SiteDiffError::InvalidConfig(format!(
                "{} name '{}' may only contain letters, digits and '_'",
                what, name
            )));
        }
    }
    check_unique(what, names.into_iter())
}

fn check_unique<'a>(what: &str, names: impl Iterator<Item = &'a str>) -> SiteDiffResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(SiteDiffError::InvalidConfig(format!("{} name must not be empty", what)));
        }
        if !seen.insert(name) {
            return Err(SiteDiffError::InvalidConfig(format!(
                "duplicate {} '{}'",
                what, name
            )));
        }
    }
    Ok(())
}

/// Capture timing and screenshot options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Upper bound for the network-idle navigation wait
    pub navigation_timeout_ms: u64,

    /// Fixed delay after navigation for client-side rendering to settle
    pub settle_delay_ms: u64,

    /// Capture the whole scrollable page
    pub full_page: bool,

    /// Freeze CSS animations and transitions during capture
    pub disable_animations: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            full_page: true,
            disable_animations: true,
        }
    }
}

impl CaptureSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// A declarative page normalization step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationRule {
    /// CSS selector of the elements the action applies to
    pub selector: String,

    #[serde(flatten)]
    pub action: NormalizationAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NormalizationAction {
    /// Force matching elements invisible
    Hide,

    /// Detach matching elements from the document
    Remove,

    /// Populate matching form fields with a placeholder value
    Fill {
        #[serde(default = "default_fill_value")]
        value: String,
    },
}

fn default_fill_value() -> String {
    DEFAULT_FILL_VALUE.to_string()
}

impl NormalizationAction {
    pub fn name(&self) -> &'static str {
        match self {
            NormalizationAction::Hide => "hide",
            NormalizationAction::Remove => "remove",
            NormalizationAction::Fill { .. } => "fill",
        }
    }
}

/// How two screenshots are classified identical or different
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComparisonStrategy {
    /// Byte-for-byte equality of the encoded images
    Exact,

    /// Per-pixel color tolerance plus a cap on the number of differing pixels
    Perceptual { threshold: f64, max_diff_pixels: u64 },
}

impl ComparisonStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ComparisonStrategy::Exact => "exact",
            ComparisonStrategy::Perceptual { .. } => "perceptual",
        }
    }

    pub fn perceptual() -> Self {
        ComparisonStrategy::Perceptual {
            threshold: DEFAULT_THRESHOLD,
            max_diff_pixels: DEFAULT_MAX_DIFF_PIXELS,
        }
    }
}

impl fmt::Display for ComparisonStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonStrategy::Exact => f.write_str("exact"),
            ComparisonStrategy::Perceptual {
                threshold,
                max_diff_pixels,
            } => write!(
                f,
                "perceptual (threshold {}, max {} px)",
                threshold, max_diff_pixels
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Exact,
    Perceptual,
}

impl FromStr for StrategyKind {
    type Err = SiteDiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(StrategyKind::Exact),
            "perceptual" => Ok(StrategyKind::Perceptual),
            other => Err(SiteDiffError::InvalidConfig(format!(
                "unknown comparison strategy '{}'",
                other
            ))),
        }
    }
}

/// Comparison settings as written in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonSettings {
    pub strategy: StrategyKind,

    /// Per-pixel color difference threshold (0.0 - 1.0)
    pub threshold: f64,

    /// Differing pixels tolerated before a pair counts as different
    pub max_diff_pixels: u64,
}

impl Default for ComparisonSettings {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Exact,
            threshold: DEFAULT_THRESHOLD,
            max_diff_pixels: DEFAULT_MAX_DIFF_PIXELS,
        }
    }
}

impl ComparisonSettings {
    pub fn strategy(&self) -> ComparisonStrategy {
        match self.strategy {
            StrategyKind::Exact => ComparisonStrategy::Exact,
            StrategyKind::Perceptual => ComparisonStrategy::Perceptual {
                threshold: self.threshold,
                max_diff_pixels: self.max_diff_pixels,
            },
        }
    }

    /// Tolerances used by the baseline workflow, which is always perceptual
    pub fn perceptual(&self) -> ComparisonStrategy {
        ComparisonStrategy::Perceptual {
            threshold: self.threshold,
            max_diff_pixels: self.max_diff_pixels,
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Directory for screenshots, result records and the report
    pub dir: PathBuf,

    /// Directory for perceptual baselines (defaults to `<dir>/baselines`)
    pub baseline_dir: Option<PathBuf>,

    /// Embed images into the HTML report as data URIs
    pub embed_images: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            baseline_dir: None,
            embed_images: true,
        }
    }
}

impl OutputSettings {
    pub fn baseline_dir(&self) -> PathBuf {
        self.baseline_dir
            .clone()
            .unwrap_or_else(|| self.dir.join("baselines"))
    }
}

/// Browser engine selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

impl FromStr for BrowserKind {
    type Err = SiteDiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" | "safari" => Ok(BrowserKind::Webkit),
            other => Err(SiteDiffError::InvalidConfig(format!(
                "unknown browser '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
