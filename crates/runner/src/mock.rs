//! In-memory browser automation service
//!
//! `StaticBrowser` serves synthetic pages keyed by URL. Pages are drawn with
//! a small rectangle API and rendered to PNG at the session's viewport, so
//! full-page captures grow with the page height exactly like a real engine.
//! Navigation failures can be scripted per URL.

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sitediff_common::{SiteDiffError, SiteDiffResult};

use crate::browser::{BrowserService, BrowserSession, ScreenshotOptions, WaitCondition};

/// How a URL behaves when navigated to
#[derive(Debug, Clone)]
enum Behavior {
    Render,
    Timeout,
    Unreachable(String),
}

/// A synthetic page
#[derive(Debug, Clone)]
pub struct MockPage {
    content_height: u32,
    background: [u8; 4],
    rects: Vec<(u32, u32, u32, u32, [u8; 4])>,
    elements: HashMap<String, u64>,
    behavior: Behavior,
}

impl MockPage {
    /// A white page whose document is `content_height` pixels tall
    pub fn new(content_height: u32) -> Self {
        Self {
            content_height,
            background: [255, 255, 255, 255],
            rects: Vec::new(),
            elements: HashMap::new(),
            behavior: Behavior::Render,
        }
    }

    /// A page whose navigation never reaches network idle
    pub fn timeout() -> Self {
        Self {
            behavior: Behavior::Timeout,
            ..Self::new(0)
        }
    }

    /// A page whose host cannot be reached
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Unreachable(reason.into()),
            ..Self::new(0)
        }
    }

    pub fn background(mut self, color: [u8; 4]) -> Self {
        self.background = color;
        self
    }

    /// Draw a filled rectangle on top of the background
    pub fn rect(mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 4]) -> Self {
        self.rects.push((x, y, w, h, color));
        self
    }

    /// Declare `count` elements matching `selector`, for normalization rules
    pub fn element(mut self, selector: impl Into<String>, count: u64) -> Self {
        self.elements.insert(selector.into(), count);
        self
    }

    fn render(&self, width: u32, height: u32) -> SiteDiffResult<Vec<u8>> {
        let mut img = RgbaImage::from_pixel(width, height, Rgba(self.background));
        for &(x, y, w, h, color) in &self.rects {
            for py in y..y.saturating_add(h).min(height) {
                for px in x..x.saturating_add(w).min(width) {
                    img.put_pixel(px, py, Rgba(color));
                }
            }
        }
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)?;
        Ok(bytes)
    }

    /// Number of declared elements whose selector appears in the script
    fn matches(&self, script: &str) -> u64 {
        self.elements
            .iter()
            .filter(|(selector, _)| {
                serde_json::to_string(selector)
                    .map(|quoted| script.contains(&quoted))
                    .unwrap_or(false)
            })
            .map(|(_, count)| *count)
            .sum()
    }
}

/// Browser service over a fixed set of synthetic pages
#[derive(Debug, Clone, Default)]
pub struct StaticBrowser {
    pages: Arc<HashMap<String, MockPage>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl StaticBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page. URLs are matched exactly.
    pub fn page(mut self, url: impl Into<String>, page: MockPage) -> Self {
        Arc::make_mut(&mut self.pages).insert(url.into(), page);
        self
    }

    /// Every stage executed so far, across all sessions
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BrowserService for StaticBrowser {
    async fn open_session(&self) -> SiteDiffResult<Box<dyn BrowserSession>> {
        Ok(Box::new(StaticSession {
            pages: Arc::clone(&self.pages),
            log: Arc::clone(&self.log),
            viewport: (1280, 720),
            current: None,
        }))
    }

    fn name(&self) -> &str {
        "static"
    }
}

struct StaticSession {
    pages: Arc<HashMap<String, MockPage>>,
    log: Arc<Mutex<Vec<String>>>,
    viewport: (u32, u32),
    current: Option<MockPage>,
}

impl StaticSession {
    fn record(&self, entry: String) {
        if let Ok(mut log) = self.log.lock() {
            log.push(entry);
        }
    }
}

#[async_trait]
impl BrowserSession for StaticSession {
    async fn set_viewport(&mut self, width: u32, height: u32) -> SiteDiffResult<()> {
        self.record(format!("set_viewport {}x{}", width, height));
        self.viewport = (width, height);
        Ok(())
    }

    async fn navigate(
        &mut self,
        url: &str,
        _wait: WaitCondition,
        timeout: Duration,
    ) -> SiteDiffResult<()> {
        self.record(format!("navigate {}", url));
        self.current = None;

        let page = self.pages.get(url).ok_or_else(|| SiteDiffError::Navigation {
            url: url.to_string(),
            reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
        })?;

        match &page.behavior {
            Behavior::Render => {
                self.current = Some(page.clone());
                Ok(())
            }
            Behavior::Timeout => Err(SiteDiffError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
            Behavior::Unreachable(reason) => Err(SiteDiffError::Navigation {
                url: url.to_string(),
                reason: reason.clone(),
            }),
        }
    }

    async fn evaluate(&mut self, script: &str) -> SiteDiffResult<serde_json::Value> {
        self.record("evaluate".to_string());
        let page = self
            .current
            .as_ref()
            .ok_or_else(|| SiteDiffError::Browser("no page loaded".to_string()))?;
        Ok(serde_json::json!(page.matches(script)))
    }

    async fn screenshot(&mut self, options: ScreenshotOptions) -> SiteDiffResult<Vec<u8>> {
        self.record(format!("screenshot full_page={}", options.full_page));
        let page = self
            .current
            .as_ref()
            .ok_or_else(|| SiteDiffError::CaptureFailure("no page loaded".to_string()))?;

        let (width, viewport_height) = self.viewport;
        let height = if options.full_page {
            page.content_height.max(viewport_height)
        } else {
            viewport_height
        };
        page.render(width, height)
    }

    async fn close(self: Box<Self>) -> SiteDiffResult<()> {
        self.record("close".to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_page_grows_with_content() {
        let browser = StaticBrowser::new().page("https://example.com/", MockPage::new(3000));
        let mut session = browser.open_session().await.unwrap();
        session.set_viewport(375, 667).await.unwrap();
        session
            .navigate("https://example.com/", WaitCondition::NetworkIdle, Duration::from_secs(30))
            .await
            .unwrap();

        let png = session.screenshot(ScreenshotOptions::default()).await.unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (375, 3000));

        let png = session
            .screenshot(ScreenshotOptions {
                full_page: false,
                disable_animations: true,
            })
            .await
            .unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (375, 667));
    }

    #[test]
    fn test_rect_past_the_edge_is_clipped() {
        let page = MockPage::new(10)
            .rect(5, 5, u32::MAX, u32::MAX, [0, 0, 0, 255])
            .rect(u32::MAX, 0, 10, 10, [255, 0, 0, 255]);
        let png = page.render(10, 10).unwrap();
        let img = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(9, 9), &Rgba([0, 0, 0, 255]));
        assert_eq!(img.get_pixel(4, 4), &Rgba([255, 255, 255, 255]));
    }

    #[tokio::test]
    async fn test_unknown_url_fails_navigation() {
        let browser = StaticBrowser::new();
        let mut session = browser.open_session().await.unwrap();
        let err = session
            .navigate(
                "https://nowhere.invalid/",
                WaitCondition::NetworkIdle,
                Duration::from_secs(30),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SiteDiffError::Navigation { .. }));
    }
}
