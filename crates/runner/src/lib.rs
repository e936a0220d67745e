//! sitediff capture and comparison engine
//!
//! Captures the same pages of a site in several environments and viewports
//! through a browser automation service, compares the screenshots and
//! writes an HTML report.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ComparisonRunner (Rust)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TargetMatrix: pages × viewports × environments             │
//! │    └── per target, environments captured concurrently       │
//! │  CaptureDriver (one BrowserSession per task)                │
//! │    ├── set_viewport(width, height)                          │
//! │    ├── navigate(url, network-idle, 30 s)                    │
//! │    ├── settle delay                                         │
//! │    ├── normalization rules { hide | remove | fill }         │
//! │    └── screenshot(full page) -> Snapshot                    │
//! │  Comparator: exact bytes | perceptual (YIQ + pixel budget)  │
//! │  ArtifactStore: PNGs + one JSON record per target           │
//! │  Report: report.html + report.json                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod capture;
pub mod mock;
pub mod normalize;
pub mod playwright;
pub mod report;
pub mod runner;
pub mod store;
pub mod visual;

pub use browser::{BrowserService, BrowserSession, ScreenshotOptions, WaitCondition};
pub use capture::CaptureDriver;
pub use mock::{MockPage, StaticBrowser};
pub use playwright::{PlaywrightConfig, PlaywrightService};
pub use report::{ImageMode, Report, ReportPaths, ReportSummary};
pub use runner::{ComparisonRunner, RunOutcome};
pub use store::ArtifactStore;
pub use visual::{compare, BaselineCheck, BaselineStore, VisualDiff};
