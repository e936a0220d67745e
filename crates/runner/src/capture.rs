//! Staged capture of one page at one viewport in one environment

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use sitediff_common::{CaptureTask, RunConfig, SiteDiffResult, Snapshot};

use crate::browser::{BrowserService, BrowserSession, ScreenshotOptions, WaitCondition};
use crate::normalize;

/// Drives a browser session through viewport, navigation, settle,
/// normalization and screenshot for each task
#[derive(Clone)]
pub struct CaptureDriver {
    browser: Arc<dyn BrowserService>,
    config: Arc<RunConfig>,
}

impl CaptureDriver {
    pub fn new(browser: Arc<dyn BrowserService>, config: Arc<RunConfig>) -> Self {
        Self { browser, config }
    }

    pub fn browser_name(&self) -> &str {
        self.browser.name()
    }

    /// Capture one task in a fresh session. The session is closed whether
    /// or not the capture succeeds.
    pub async fn capture(&self, task: &CaptureTask) -> SiteDiffResult<Snapshot> {
        let start = Instant::now();
        debug!("Capturing {}", task);

        let mut session = self.browser.open_session().await?;
        let result = self.run_stages(session.as_mut(), task).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close browser session for {}: {}", task, e);
        }

        match &result {
            Ok(snapshot) => info!(
                "✓ {} {}x{} ({} ms)",
                task,
                snapshot.width,
                snapshot.height,
                start.elapsed().as_millis()
            ),
            Err(e) => error!("✗ {} - {}", task, e),
        }

        result
    }

    async fn run_stages(
        &self,
        session: &mut dyn BrowserSession,
        task: &CaptureTask,
    ) -> SiteDiffResult<Snapshot> {
        let capture = &self.config.capture;

        session
            .set_viewport(task.viewport.width, task.viewport.height)
            .await?;

        session
            .navigate(
                task.url.as_str(),
                WaitCondition::NetworkIdle,
                capture.navigation_timeout(),
            )
            .await?;

        // Late-loading fonts, images and animations
        tokio::time::sleep(capture.settle_delay()).await;

        normalize::apply_rules(session, &self.config.normalization).await;

        let bytes = session
            .screenshot(ScreenshotOptions {
                full_page: capture.full_page,
                disable_animations: capture.disable_animations,
            })
            .await?;

        let snapshot = Snapshot::new(task.clone(), bytes)?;
        if !snapshot.matches_viewport() {
            warn!(
                "Snapshot of {} is {}x{}, expected width {} and height >= {}",
                task,
                snapshot.width,
                snapshot.height,
                task.viewport.width,
                task.viewport.height
            );
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPage, StaticBrowser};
    use sitediff_common::{Environment, PageTarget, SiteDiffError, ViewportProfile};

    fn config() -> Arc<RunConfig> {
        let mut config = RunConfig::default();
        config.capture.settle_delay_ms = 0;
        Arc::new(config)
    }

    fn task(path: &str, viewport: ViewportProfile) -> CaptureTask {
        CaptureTask::new(
            PageTarget::new(path).unwrap(),
            viewport,
            Environment::new("production", "https://www.example.com").unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let browser = StaticBrowser::new().page(
            "https://www.example.com/",
            MockPage::new(2400).element("#cookie-notice, #cookie-law-info-bar, .cookie-banner", 1),
        );
        let driver = CaptureDriver::new(Arc::new(browser.clone()), config());

        let snapshot = driver
            .capture(&task("/", ViewportProfile::new("desktop", 1920, 1080)))
            .await
            .unwrap();
        assert_eq!((snapshot.width, snapshot.height), (1920, 2400));

        let calls = browser.calls();
        assert_eq!(calls[0], "set_viewport 1920x1080");
        assert_eq!(calls[1], "navigate https://www.example.com/");
        // One evaluation per default normalization rule
        assert_eq!(calls[2], "evaluate");
        assert_eq!(calls[3], "evaluate");
        assert_eq!(calls[4], "screenshot full_page=true");
        assert_eq!(calls[5], "close");
    }

    #[tokio::test]
    async fn test_timeout_still_closes_session() {
        let browser =
            StaticBrowser::new().page("https://www.example.com/contact/", MockPage::timeout());
        let driver = CaptureDriver::new(Arc::new(browser.clone()), config());

        let err = driver
            .capture(&task("/contact/", ViewportProfile::new("mobile", 375, 667)))
            .await
            .unwrap_err();
        assert!(matches!(err, SiteDiffError::NavigationTimeout { timeout_ms: 30_000, .. }));
        assert_eq!(browser.calls().last().map(String::as_str), Some("close"));
        assert!(!browser.calls().iter().any(|c| c.starts_with("screenshot")));
    }

    #[tokio::test]
    async fn test_missing_normalization_target_is_not_fatal() {
        let browser = StaticBrowser::new().page("https://www.example.com/", MockPage::new(100));
        let driver = CaptureDriver::new(Arc::new(browser), config());

        let snapshot = driver
            .capture(&task("/", ViewportProfile::new("mobile", 375, 667)))
            .await
            .unwrap();
        assert_eq!((snapshot.width, snapshot.height), (375, 667));
    }
}
