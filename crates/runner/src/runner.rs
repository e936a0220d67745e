//! Run orchestration: matrix → capture → compare → persist → report

use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use sitediff_common::{
    CaptureTask, ComparisonResult, ComparisonStatus, ComparisonStrategy, PageRef, RunConfig,
    SiteDiffError, SiteDiffResult, Snapshot, Target, TargetMatrix,
};

use crate::browser::BrowserService;
use crate::capture::CaptureDriver;
use crate::report::{ImageMode, Report, ReportPaths};
use crate::store::{ArtifactStore, REPORT_PREFIX};
use crate::visual::{self, BaselineCheck, BaselineStore, VisualDiff};

/// Label of the stored side in baseline results
pub const BASELINE_LABEL: &str = "baseline";

/// File stem of the comparison workflow's report
pub const REPORT_STEM: &str = "report";

/// File stem of the baseline workflow's report
pub const BASELINE_REPORT_STEM: &str = "baseline-report";

/// Result of a complete run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: Report,
    pub paths: ReportPaths,
    pub duration_ms: u64,
}

impl RunOutcome {
    pub fn has_differences(&self) -> bool {
        self.report.summary.different_count > 0
    }

    pub fn has_errors(&self) -> bool {
        self.report.summary.error_count > 0
    }
}

/// Orchestrates both workflows over a shared configuration and browser
pub struct ComparisonRunner {
    config: Arc<RunConfig>,
    driver: CaptureDriver,
}

impl ComparisonRunner {
    pub fn new(config: Arc<RunConfig>, browser: Arc<dyn BrowserService>) -> Self {
        Self {
            driver: CaptureDriver::new(browser, Arc::clone(&config)),
            config,
        }
    }

    fn image_mode(&self) -> ImageMode {
        if self.config.output.embed_images {
            ImageMode::Embed
        } else {
            ImageMode::Link
        }
    }

    /// Capture every target in two environments, compare each pair and
    /// write the report.
    pub async fn run_comparison(&self) -> SiteDiffResult<RunOutcome> {
        let start = Instant::now();
        let matrix = TargetMatrix::for_comparison(&self.config)?;
        let store = ArtifactStore::create(&self.config.output.dir, REPORT_PREFIX)?;
        let strategy = self.config.comparison.strategy();
        let environments: Vec<String> =
            matrix.environments().iter().map(|e| e.name.clone()).collect();

        info!(
            "Comparing {} across {} target(s) with {} browser, strategy {}",
            environments.join(" vs "),
            matrix.targets().len(),
            self.driver.browser_name(),
            strategy
        );

        let results: Vec<ComparisonResult> = stream::iter(matrix.targets())
            .map(|target| self.compare_target(&matrix, &store, target, strategy))
            .buffered(self.config.workers)
            .collect()
            .await;

        let report = Report::new("Visual comparison", environments, strategy.to_string(), results);
        let paths = report.write(store.dir(), REPORT_STEM, self.image_mode())?;
        Ok(self.finish(report, paths, start))
    }

    /// Capture every target in one environment and check it against the
    /// stored perceptual baselines.
    pub async fn run_baseline(
        &self,
        environment: Option<&str>,
        update: bool,
    ) -> SiteDiffResult<RunOutcome> {
        let start = Instant::now();
        let name = match environment {
            Some(name) => name.to_string(),
            None => self
                .config
                .environments
                .first()
                .map(|e| e.name.clone())
                .ok_or_else(|| {
                    SiteDiffError::InvalidConfig("no environment configured".to_string())
                })?,
        };

        let matrix = TargetMatrix::for_environment(&self.config, &name)?;
        // Unprefixed records share the directory with the report files
        if let Some(target) = matrix.targets().iter().find(|t| t.key() == BASELINE_REPORT_STEM) {
            return Err(SiteDiffError::DuplicateTarget(format!(
                "{} @ {} would overwrite {}.json",
                target.page, target.viewport.name, BASELINE_REPORT_STEM
            )));
        }
        let store = ArtifactStore::create(&self.config.output.dir, "")?;
        let baselines = BaselineStore::open(self.config.output.baseline_dir(), update)?;
        let strategy = self.config.comparison.perceptual();

        info!(
            "Checking {} target(s) of {} against baselines in {}{}",
            matrix.targets().len(),
            name,
            baselines.dir().display(),
            if update { " (updating)" } else { "" }
        );

        let results: Vec<ComparisonResult> = stream::iter(matrix.targets())
            .map(|target| self.check_target(&matrix, &store, &baselines, target, strategy))
            .buffered(self.config.workers)
            .collect()
            .await;

        let report = Report::new(
            "Baseline check",
            vec![BASELINE_LABEL.to_string(), name],
            strategy.to_string(),
            results,
        );
        let paths = report.write(store.dir(), BASELINE_REPORT_STEM, self.image_mode())?;
        Ok(self.finish(report, paths, start))
    }

    fn finish(&self, report: Report, paths: ReportPaths, start: Instant) -> RunOutcome {
        let duration_ms = start.elapsed().as_millis() as u64;
        let s = &report.summary;

        info!("");
        info!(
            "Results: {} identical, {} different, {} error(s) across {} page(s) and {} device type(s) ({} ms)",
            s.identical_count,
            s.different_count,
            s.error_count,
            s.pages_tested,
            s.device_types,
            duration_ms
        );

        RunOutcome {
            report,
            paths,
            duration_ms,
        }
    }

    async fn compare_target(
        &self,
        matrix: &TargetMatrix,
        store: &ArtifactStore,
        target: &Target,
        strategy: ComparisonStrategy,
    ) -> ComparisonResult {
        let result = self.compare_pair(matrix, store, target, strategy).await;
        log_result(&result);
        self.write_record(store, &result).await;
        result
    }

    async fn compare_pair(
        &self,
        matrix: &TargetMatrix,
        store: &ArtifactStore,
        target: &Target,
        strategy: ComparisonStrategy,
    ) -> ComparisonResult {
        let envs = matrix.environments();
        let label = |i: usize| envs.get(i).map(|e| e.name.clone()).unwrap_or_default();
        let mut result = blank_result(target, (label(0), label(1)), strategy);

        let tasks = match matrix.tasks_for(target) {
            Ok(tasks) => tasks,
            Err(e) => return fail(result, &[e]),
        };
        let [task_a, task_b] = tasks.as_slice() else {
            let e = SiteDiffError::ComparisonSkipped(format!(
                "expected two environments for {}, got {}",
                target.key(),
                tasks.len()
            ));
            return fail(result, &[e]);
        };
        result.urls = (task_a.url.to_string(), task_b.url.to_string());

        let (a, b) = tokio::join!(
            self.capture_and_store(store, task_a),
            self.capture_and_store(store, task_b)
        );

        if let Ok((snapshot, path)) = &a {
            result.snapshot_path_a = Some(path.clone());
            result.sha256_a = Some(snapshot.sha256.clone());
        }
        if let Ok((snapshot, path)) = &b {
            result.snapshot_path_b = Some(path.clone());
            result.sha256_b = Some(snapshot.sha256.clone());
        }

        match (a, b) {
            (Ok((a, _)), Ok((b, _))) => {
                match blocking(move || visual::compare_snapshots(&a, &b, strategy)).await {
                    Ok(diff) => self.apply_diff(result, store, &target.key(), diff).await,
                    Err(e) => fail(result, &[skipped(e)]),
                }
            }
            (a, b) => {
                let errors: Vec<SiteDiffError> = [a.err(), b.err()].into_iter().flatten().collect();
                fail(result, &errors)
            }
        }
    }

    async fn check_target(
        &self,
        matrix: &TargetMatrix,
        store: &ArtifactStore,
        baselines: &BaselineStore,
        target: &Target,
        strategy: ComparisonStrategy,
    ) -> ComparisonResult {
        let result = self
            .check_against_baseline(matrix, store, baselines, target, strategy)
            .await;
        log_result(&result);
        self.write_record(store, &result).await;
        result
    }

    async fn check_against_baseline(
        &self,
        matrix: &TargetMatrix,
        store: &ArtifactStore,
        baselines: &BaselineStore,
        target: &Target,
        strategy: ComparisonStrategy,
    ) -> ComparisonResult {
        let env = matrix
            .environments()
            .first()
            .map(|e| e.name.clone())
            .unwrap_or_default();
        let key = target.key();
        let mut result = blank_result(target, (BASELINE_LABEL.to_string(), env), strategy);

        let task = match matrix.tasks_for(target) {
            Ok(tasks) => match tasks.into_iter().next() {
                Some(task) => task,
                None => {
                    let e = SiteDiffError::ComparisonSkipped(format!("no task for {}", key));
                    return fail(result, &[e]);
                }
            },
            Err(e) => return fail(result, &[e]),
        };
        result.urls = (
            baselines.path_for(&key).display().to_string(),
            task.url.to_string(),
        );

        let (snapshot, path) = match self.capture_and_store(store, &task).await {
            Ok(captured) => captured,
            Err(e) => return fail(result, &[e]),
        };
        let sha256 = snapshot.sha256.clone();
        result.snapshot_path_b = Some(path);
        result.sha256_b = Some(sha256.clone());

        let baselines = baselines.clone();
        match blocking(move || baselines.check(&snapshot, strategy)).await {
            Ok(BaselineCheck::Created { path }) | Ok(BaselineCheck::Updated { path }) => {
                result.snapshot_path_a = Some(path);
                result.sha256_a = Some(sha256);
                result.baseline_created = true;
                result.identical = true;
                result.status = ComparisonStatus::Identical;
                result
            }
            Ok(BaselineCheck::Compared {
                path,
                baseline_sha256,
                diff,
            }) => {
                result.snapshot_path_a = Some(path);
                result.sha256_a = Some(baseline_sha256);
                self.apply_diff(result, store, &key, diff).await
            }
            Err(e) => fail(result, &[skipped(e)]),
        }
    }

    async fn capture_and_store(
        &self,
        store: &ArtifactStore,
        task: &CaptureTask,
    ) -> SiteDiffResult<(Snapshot, PathBuf)> {
        let snapshot = self.driver.capture(task).await?;
        let path = store.write_snapshot(&snapshot).await?;
        Ok((snapshot, path))
    }

    async fn apply_diff(
        &self,
        mut result: ComparisonResult,
        store: &ArtifactStore,
        key: &str,
        diff: VisualDiff,
    ) -> ComparisonResult {
        result.identical = diff.identical;
        result.status = if diff.identical {
            ComparisonStatus::Identical
        } else {
            ComparisonStatus::Different
        };
        result.diff_pixels = diff.diff_pixels;

        if !diff.identical {
            if let Some(png) = &diff.diff_image {
                match store.write_diff(key, png).await {
                    Ok(path) => result.diff_image_path = Some(path),
                    Err(e) => warn!("Failed to write diff image for {}: {}", key, e),
                }
            }
        }
        result
    }

    async fn write_record(&self, store: &ArtifactStore, result: &ComparisonResult) {
        match store.write_record(result).await {
            Ok(path) => debug!("Result record: {}", path.display()),
            Err(e) => error!(
                "Failed to write result record for {} @ {}: {}",
                result.page.path, result.viewport.name, e
            ),
        }
    }
}

/// Run decoding, pixel comparison and baseline file access on the blocking
/// pool so that concurrent captures keep their timers running.
async fn blocking<T, F>(work: F) -> SiteDiffResult<T>
where
    F: FnOnce() -> SiteDiffResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SiteDiffError::ComparisonSkipped(format!("comparison task failed: {}", e)))?
}

fn skipped(error: SiteDiffError) -> SiteDiffError {
    match error {
        SiteDiffError::ComparisonSkipped(_) => error,
        other => SiteDiffError::ComparisonSkipped(other.to_string()),
    }
}

fn blank_result(
    target: &Target,
    environments: (String, String),
    strategy: ComparisonStrategy,
) -> ComparisonResult {
    ComparisonResult {
        page: PageRef::from(&target.page),
        viewport: target.viewport.clone(),
        environments,
        urls: (String::new(), String::new()),
        status: ComparisonStatus::Error,
        identical: false,
        strategy: strategy.name().to_string(),
        snapshot_path_a: None,
        snapshot_path_b: None,
        sha256_a: None,
        sha256_b: None,
        diff_pixels: None,
        diff_image_path: None,
        baseline_created: false,
        error: None,
        error_kind: None,
        timestamp: chrono::Utc::now(),
    }
}

/// Mark a result as failed. No comparison happened, so it stays out of the
/// identical/different tally.
fn fail(mut result: ComparisonResult, errors: &[SiteDiffError]) -> ComparisonResult {
    result.status = ComparisonStatus::Error;
    result.identical = false;
    result.error = Some(
        errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; "),
    );
    result.error_kind = errors.first().map(|e| e.kind().to_string());
    result
}

fn log_result(result: &ComparisonResult) {
    let what = format!("{} @ {}", result.page.path, result.viewport.name);
    match result.status {
        ComparisonStatus::Identical if result.baseline_created => {
            info!("✓ {}: baseline written", what)
        }
        ComparisonStatus::Identical => info!("✓ {}: IDENTICAL", what),
        ComparisonStatus::Different => match result.diff_pixels {
            Some(pixels) => warn!("✗ {}: DIFFERENT ({} pixels)", what, pixels),
            None => warn!("✗ {}: DIFFERENT", what),
        },
        ComparisonStatus::Error => error!(
            "✗ {}: ERROR - {}",
            what,
            result.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blocking_work_leaves_the_runtime_thread() {
        let runtime_thread = std::thread::current().id();
        let worker_thread = blocking(|| Ok(std::thread::current().id())).await.unwrap();
        assert_ne!(runtime_thread, worker_thread);
    }

    #[tokio::test]
    async fn test_blocking_panic_becomes_skipped_comparison() {
        let err = blocking::<(), _>(|| panic!("decoder crashed")).await.unwrap_err();
        assert_eq!(err.kind(), "comparison_skipped");
    }

    #[test]
    fn test_skipped_wraps_once() {
        let wrapped = skipped(SiteDiffError::CaptureFailure("truncated PNG".to_string()));
        assert_eq!(wrapped.to_string(), "Comparison skipped: Capture failed: truncated PNG");
        let again = skipped(wrapped);
        assert_eq!(again.to_string(), "Comparison skipped: Capture failed: truncated PNG");
    }
}
