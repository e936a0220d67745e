//! Browser automation service abstraction
//!
//! The capture driver only talks to these traits. A [`BrowserService`] hands
//! out isolated sessions (one browser context per capture task); a
//! [`BrowserSession`] runs one stage at a time and every stage is awaited
//! before the next one starts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use sitediff_common::SiteDiffResult;

/// Readiness condition for a navigation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitCondition {
    /// No network connections for a short window
    #[default]
    NetworkIdle,
    /// The `load` event fired
    Load,
    /// The `DOMContentLoaded` event fired
    DomContentLoaded,
}

impl WaitCondition {
    /// Name understood by the Playwright `waitUntil` option
    pub fn as_playwright(&self) -> &'static str {
        match self {
            WaitCondition::NetworkIdle => "networkidle",
            WaitCondition::Load => "load",
            WaitCondition::DomContentLoaded => "domcontentloaded",
        }
    }
}

/// Screenshot options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotOptions {
    pub full_page: bool,
    pub disable_animations: bool,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            full_page: true,
            disable_animations: true,
        }
    }
}

/// Factory for isolated browser sessions
#[async_trait]
pub trait BrowserService: Send + Sync {
    /// Open a fresh, isolated session
    async fn open_session(&self) -> SiteDiffResult<Box<dyn BrowserSession>>;

    /// Engine name used in logs
    fn name(&self) -> &str;
}

/// A single page in its own browser context
#[async_trait]
pub trait BrowserSession: Send {
    /// Resize the viewport
    async fn set_viewport(&mut self, width: u32, height: u32) -> SiteDiffResult<()>;

    /// Navigate and wait for `wait`, bounded by `timeout`.
    ///
    /// Exceeding the timeout yields `SiteDiffError::NavigationTimeout`.
    async fn navigate(
        &mut self,
        url: &str,
        wait: WaitCondition,
        timeout: Duration,
    ) -> SiteDiffResult<()>;

    /// Evaluate a JavaScript expression in the page and return its JSON value
    async fn evaluate(&mut self, script: &str) -> SiteDiffResult<serde_json::Value>;

    /// Capture the page as PNG bytes
    async fn screenshot(&mut self, options: ScreenshotOptions) -> SiteDiffResult<Vec<u8>>;

    /// Release the session
    async fn close(self: Box<Self>) -> SiteDiffResult<()>;
}
