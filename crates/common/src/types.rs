//! Core data model shared by the capture, comparison and report stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;
use url::Url;

use crate::error::{SiteDiffError, SiteDiffResult};

/// Token used as the page identifier of the site root
pub const ROOT_PAGE_ID: &str = "home";

// ============================================================================
// Configuration-time entities
// ============================================================================

/// A named deployment target with its own base URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    pub base_url: Url,
}

impl Environment {
    pub fn new(name: impl Into<String>, base_url: &str) -> SiteDiffResult<Self> {
        Ok(Self {
            name: name.into(),
            base_url: Url::parse(base_url)?,
        })
    }

    /// Resolve a site-relative page against this environment.
    ///
    /// The base URL may carry a path prefix, so this concatenates instead of
    /// using `Url::join` (which would drop the prefix for absolute paths).
    pub fn resolve(&self, page: &PageTarget) -> SiteDiffResult<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}{}", base, page.path()))?)
    }
}

/// A named screen-size configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportProfile {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl ViewportProfile {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }
}

impl fmt::Display for ViewportProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}x{})", self.name, self.width, self.height)
    }
}

/// A site-relative page path, validated on construction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PageTarget {
    path: String,
}

impl PageTarget {
    pub fn new(path: impl Into<String>) -> SiteDiffResult<Self> {
        let path = path.into();
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(SiteDiffError::InvalidConfig(
                "page path must not be empty".to_string(),
            ));
        }
        if !trimmed.starts_with('/') {
            return Err(SiteDiffError::InvalidConfig(format!(
                "page path '{}' must start with '/'",
                trimmed
            )));
        }
        Ok(Self {
            path: trimmed.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Filesystem-safe identifier for this page.
    ///
    /// `/` becomes `home`, `/communities/eagle/` becomes `communities-eagle`.
    pub fn page_id(&self) -> String {
        let trimmed = self.path.trim_matches('/');
        if trimmed.is_empty() {
            return ROOT_PAGE_ID.to_string();
        }
        sanitize_name(&trimmed.replace('/', "-"))
    }
}

impl TryFrom<String> for PageTarget {
    type Error = SiteDiffError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PageTarget> for String {
    fn from(page: PageTarget) -> Self {
        page.path
    }
}

impl fmt::Display for PageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Identity of a (viewport, page) pair: `{viewport}-{page_id}`.
///
/// Shared by every environment's capture of the pair, and used for record,
/// diff image and baseline file names.
pub fn target_key(viewport: &ViewportProfile, page_id: &str) -> String {
    format!("{}-{}", sanitize_name(&viewport.name), page_id)
}

/// Sanitize a name for use in filenames
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

// ============================================================================
// Run-time entities
// ============================================================================

/// One (page, viewport, environment) capture with its resolved URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureTask {
    pub page: PageTarget,
    pub viewport: ViewportProfile,
    pub environment: Environment,
    pub url: Url,
}

impl CaptureTask {
    pub fn new(
        page: PageTarget,
        viewport: ViewportProfile,
        environment: Environment,
    ) -> SiteDiffResult<Self> {
        let url = environment.resolve(&page)?;
        Ok(Self {
            page,
            viewport,
            environment,
            url,
        })
    }

    /// The task's identity: `{viewport}-{page_id}-{environment}`
    pub fn naming_key(&self) -> String {
        format!("{}-{}", self.target_key(), sanitize_name(&self.environment.name))
    }

    /// Identity of the (page, viewport) pair, shared across environments
    pub fn target_key(&self) -> String {
        target_key(&self.viewport, &self.page.page_id())
    }
}

impl fmt::Display for CaptureTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {} [{}]",
            self.page, self.viewport.name, self.environment.name
        )
    }
}

/// A captured full-page raster image. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub task: CaptureTask,
    pub image_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sha256: String,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Build a snapshot from encoded image bytes, reading the dimensions
    /// from the image header.
    pub fn new(task: CaptureTask, image_bytes: Vec<u8>) -> SiteDiffResult<Self> {
        if image_bytes.is_empty() {
            return Err(SiteDiffError::CaptureFailure(format!(
                "empty screenshot for {}",
                task
            )));
        }
        let (width, height) = image::io::Reader::new(Cursor::new(&image_bytes))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| {
                SiteDiffError::CaptureFailure(format!("undecodable screenshot for {}: {}", task, e))
            })?;

        Ok(Self {
            sha256: sha256_hex(&image_bytes),
            task,
            image_bytes,
            width,
            height,
            captured_at: Utc::now(),
        })
    }

    /// Whether the image fits the requested viewport: exact width, and a
    /// height that only grows through full-page scrolling.
    pub fn matches_viewport(&self) -> bool {
        self.width == self.task.viewport.width && self.height >= self.task.viewport.height
    }
}

/// Compute the hex SHA-256 digest of a byte slice
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Outcome of comparing one (page, viewport) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonStatus {
    Identical,
    Different,
    Error,
}

impl ComparisonStatus {
    /// Label shown on the report badge
    pub fn badge(&self) -> &'static str {
        match self {
            ComparisonStatus::Identical => "IDENTICAL",
            ComparisonStatus::Different => "DIFFERENT",
            ComparisonStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.badge())
    }
}

/// Page identity as recorded in result files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    pub path: String,
    pub id: String,
}

impl From<&PageTarget> for PageRef {
    fn from(page: &PageTarget) -> Self {
        Self {
            path: page.path().to_string(),
            id: page.page_id(),
        }
    }
}

/// One record per (page, viewport) per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub page: PageRef,
    pub viewport: ViewportProfile,
    pub environments: (String, String),
    pub urls: (String, String),
    pub status: ComparisonStatus,
    pub identical: bool,
    pub strategy: String,
    pub snapshot_path_a: Option<PathBuf>,
    pub snapshot_path_b: Option<PathBuf>,
    pub sha256_a: Option<String>,
    pub sha256_b: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_pixels: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_image_path: Option<PathBuf>,
    #[serde(default)]
    pub baseline_created: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ComparisonResult {
    /// Whether a comparison was actually performed
    pub fn is_completed(&self) -> bool {
        self.status != ComparisonStatus::Error
    }

    pub fn target_key(&self) -> String {
        target_key(&self.viewport, &self.page.id)
    }
}
