//! Perceptual baseline workflow against the in-memory browser

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use sitediff_common::{ComparisonStatus, PageTarget, RunConfig, ViewportProfile};
use sitediff_runner::{BaselineStore, ComparisonRunner, MockPage, StaticBrowser};

const PROD_HOME: &str = "https://www.example.com/";
const PROD_CONTACT: &str = "https://www.example.com/contact/";

fn config(out: &Path) -> RunConfig {
    let mut config = RunConfig::default();
    config.viewports = vec![ViewportProfile::new("desktop", 1280, 800)];
    config.pages = vec![
        PageTarget::new("/").unwrap(),
        PageTarget::new("/contact/").unwrap(),
    ];
    config.capture.settle_delay_ms = 0;
    config.output.dir = out.to_path_buf();
    config
}

fn site(banner: [u8; 4]) -> StaticBrowser {
    StaticBrowser::new()
        .page(PROD_HOME, MockPage::new(1600).rect(0, 0, 1280, 120, banner))
        .page(PROD_CONTACT, MockPage::new(900))
}

#[tokio::test]
async fn test_first_run_creates_baselines() {
    let out = TempDir::new().unwrap();
    let config = Arc::new(config(out.path()));
    let runner = ComparisonRunner::new(Arc::clone(&config), Arc::new(site([0, 90, 160, 255])));

    let outcome = runner.run_baseline(Some("production"), false).await.unwrap();
    assert_eq!(outcome.report.summary.identical_count, 2);
    assert!(outcome
        .report
        .results
        .iter()
        .all(|r| r.baseline_created && r.status == ComparisonStatus::Identical));

    let store = BaselineStore::open(config.output.baseline_dir(), false).unwrap();
    assert_eq!(
        store.list().unwrap(),
        vec!["desktop-contact".to_string(), "desktop-home".to_string()]
    );
    assert_eq!(store.dimensions("desktop-home").unwrap(), (1280, 1600));

    // Baseline workflow writes without the report prefix
    assert!(out.path().join("desktop-home-production.png").exists());
    assert!(out.path().join("desktop-home.json").exists());
    assert!(out.path().join("baseline-report.html").exists());
}

#[tokio::test]
async fn test_second_run_detects_regression() {
    let out = TempDir::new().unwrap();
    let config = Arc::new(config(out.path()));

    let first = ComparisonRunner::new(Arc::clone(&config), Arc::new(site([0, 90, 160, 255])));
    first.run_baseline(None, false).await.unwrap();

    // The header banner turned red: 1280×120 pixels change
    let second = ComparisonRunner::new(Arc::clone(&config), Arc::new(site([200, 0, 0, 255])));
    let outcome = second.run_baseline(None, false).await.unwrap();

    let home = &outcome.report.results[0];
    assert_eq!(home.page.id, "home");
    assert!(!home.baseline_created);
    assert_eq!(home.status, ComparisonStatus::Different);
    assert_eq!(home.diff_pixels, Some(1280 * 120));
    assert_ne!(home.sha256_a, home.sha256_b);
    assert_eq!(home.environments.0, "baseline");

    let contact = &outcome.report.results[1];
    assert_eq!(contact.status, ComparisonStatus::Identical);
    assert_eq!(contact.diff_pixels, Some(0));

    assert!(outcome.has_differences());
    assert!(out.path().join("desktop-home.diff.png").exists());
}

#[tokio::test]
async fn test_update_overwrites_baselines() {
    let out = TempDir::new().unwrap();
    let config = Arc::new(config(out.path()));

    ComparisonRunner::new(Arc::clone(&config), Arc::new(site([0, 90, 160, 255])))
        .run_baseline(None, false)
        .await
        .unwrap();

    let red = ComparisonRunner::new(Arc::clone(&config), Arc::new(site([200, 0, 0, 255])));
    let updated = red.run_baseline(None, true).await.unwrap();
    assert!(!updated.has_differences());

    let rechecked = red.run_baseline(None, false).await.unwrap();
    assert_eq!(rechecked.report.summary.identical_count, 2);
    assert!(rechecked.report.results.iter().all(|r| !r.baseline_created));
}

#[tokio::test]
async fn test_unknown_environment_is_rejected() {
    let out = TempDir::new().unwrap();
    let runner = ComparisonRunner::new(
        Arc::new(config(out.path())),
        Arc::new(site([0, 0, 0, 255])),
    );
    let err = runner.run_baseline(Some("staging"), false).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_config");
}

fn image_sources(html: &str) -> Vec<String> {
    html.split("<img src=\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_linked_images_resolve_from_report() {
    let root = TempDir::new().unwrap();
    let out = root.path().join("out");
    let mut config = config(&out);
    config.output.embed_images = false;
    config.output.baseline_dir = Some(root.path().join("approved"));

    let runner = ComparisonRunner::new(Arc::new(config), Arc::new(site([0, 90, 160, 255])));
    let outcome = runner.run_baseline(None, false).await.unwrap();

    let html = std::fs::read_to_string(&outcome.paths.html).unwrap();
    let sources = image_sources(&html);
    assert!(sources.contains(&"../approved/desktop-home.png".to_string()));
    assert!(sources.contains(&"desktop-home-production.png".to_string()));
    for src in &sources {
        assert!(out.join(src).exists(), "broken link {}", src);
    }
}

#[tokio::test]
async fn test_default_baseline_dir_is_linked_below_report() {
    let out = TempDir::new().unwrap();
    let mut config = config(out.path());
    config.output.embed_images = false;

    let runner = ComparisonRunner::new(Arc::new(config), Arc::new(site([0, 90, 160, 255])));
    let outcome = runner.run_baseline(None, false).await.unwrap();

    let html = std::fs::read_to_string(&outcome.paths.html).unwrap();
    assert!(image_sources(&html).contains(&"baselines/desktop-contact.png".to_string()));
}

#[tokio::test]
async fn test_capture_failure_keeps_record() {
    let out = TempDir::new().unwrap();
    let browser = StaticBrowser::new()
        .page(PROD_HOME, MockPage::new(1600))
        .page(PROD_CONTACT, MockPage::unreachable("net::ERR_CONNECTION_RESET"));
    let runner = ComparisonRunner::new(Arc::new(config(out.path())), Arc::new(browser));
    let outcome = runner.run_baseline(None, false).await.unwrap();

    let contact = &outcome.report.results[1];
    assert_eq!(contact.status, ComparisonStatus::Error);
    assert_eq!(contact.error_kind.as_deref(), Some("navigation"));
    assert!(!contact.baseline_created);
    assert!(outcome.has_errors());

    let record = std::fs::read_to_string(out.path().join("desktop-contact.json")).unwrap();
    assert!(record.contains("ERR_CONNECTION_RESET"));
    let store = BaselineStore::open(out.path().join("baselines"), false).unwrap();
    assert_eq!(store.list().unwrap(), vec!["desktop-home".to_string()]);
}

#[tokio::test]
async fn test_record_cannot_shadow_report() {
    let out = TempDir::new().unwrap();
    let mut config = config(out.path());
    config.viewports = vec![ViewportProfile::new("baseline", 1280, 800)];
    config.pages = vec![PageTarget::new("/report/").unwrap()];

    let runner = ComparisonRunner::new(Arc::new(config), Arc::new(StaticBrowser::new()));
    let err = runner.run_baseline(None, false).await.unwrap_err();
    assert_eq!(err.kind(), "duplicate_target");
    assert!(!out.path().join("baseline-report.json").exists());
}
