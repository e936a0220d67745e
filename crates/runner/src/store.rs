//! Output directory layout
//!
//! Every artifact of a run lands flat in one directory:
//!
//! ```text
//! {prefix}{viewport}-{page_id}-{environment}.png   snapshot
//! {prefix}{viewport}-{page_id}.diff.png            perceptual diff highlight
//! {prefix}{viewport}-{page_id}.json                comparison record
//! ```
//!
//! Environment and viewport names never contain `-` or `.`, so the three
//! shapes cannot collide.

use std::path::{Path, PathBuf};
use tracing::debug;

use sitediff_common::{CaptureTask, ComparisonResult, SiteDiffError, SiteDiffResult, Snapshot};

/// Prefix of the cross-environment workflow's artifacts
pub const REPORT_PREFIX: &str = "report-";

/// Writes snapshots and result records under a single output directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    prefix: String,
}

impl ArtifactStore {
    /// Open the store, creating the directory if needed
    pub fn create(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> SiteDiffResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| SiteDiffError::OutputDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self, task: &CaptureTask) -> PathBuf {
        self.dir
            .join(format!("{}{}.png", self.prefix, task.naming_key()))
    }

    pub fn diff_path(&self, target_key: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}.diff.png", self.prefix, target_key))
    }

    pub fn record_path(&self, target_key: &str) -> PathBuf {
        self.dir.join(format!("{}{}.json", self.prefix, target_key))
    }

    /// Write a snapshot's image. Rewrites any file left by a previous run.
    pub async fn write_snapshot(&self, snapshot: &Snapshot) -> SiteDiffResult<PathBuf> {
        let path = self.snapshot_path(&snapshot.task);
        tokio::fs::write(&path, &snapshot.image_bytes).await?;
        debug!("Snapshot written to: {}", path.display());
        Ok(path)
    }

    pub async fn write_diff(&self, target_key: &str, png: &[u8]) -> SiteDiffResult<PathBuf> {
        let path = self.diff_path(target_key);
        tokio::fs::write(&path, png).await?;
        debug!("Diff image written to: {}", path.display());
        Ok(path)
    }

    /// Write the result record of one (page, viewport) pair
    pub async fn write_record(&self, result: &ComparisonResult) -> SiteDiffResult<PathBuf> {
        let path = self.record_path(&result.target_key());
        let json = serde_json::to_string_pretty(result)?;
        tokio::fs::write(&path, json).await?;
        debug!("Record written to: {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitediff_common::{Environment, PageTarget, ViewportProfile};

    fn task(path: &str, viewport: &str, env: &str) -> CaptureTask {
        CaptureTask::new(
            PageTarget::new(path).unwrap(),
            ViewportProfile::new(viewport, 375, 667),
            Environment::new(env, "https://www.example.com").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_paths_carry_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::create(dir.path(), REPORT_PREFIX).unwrap();

        let path = store.snapshot_path(&task("/communities/eagle/", "mobile", "development"));
        assert_eq!(
            path.file_name().unwrap(),
            "report-mobile-communities-eagle-development.png"
        );
        assert_eq!(
            store.record_path("mobile-home").file_name().unwrap(),
            "report-mobile-home.json"
        );
        assert_eq!(
            store.diff_path("mobile-home").file_name().unwrap(),
            "report-mobile-home.diff.png"
        );
    }

    #[test]
    fn test_create_makes_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = ArtifactStore::create(&nested, "").unwrap();
        assert!(store.dir().is_dir());
    }

    #[test]
    fn test_create_fails_under_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();

        let err = ArtifactStore::create(file.join("out"), "").unwrap_err();
        assert!(matches!(err, SiteDiffError::OutputDir { .. }));
    }
}
