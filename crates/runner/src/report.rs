//! HTML and JSON report of a comparison run

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};
use tracing::info;

use sitediff_common::{ComparisonResult, ComparisonStatus, SiteDiffError, SiteDiffResult};

/// How snapshot images are referenced from the HTML document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMode {
    /// Inline base64 data URIs; the document is self-contained
    Embed,

    /// Links relative to the report's directory
    Link,
}

/// Aggregate counts over all results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub pages_tested: usize,
    pub device_types: usize,
    pub total: usize,
    pub identical_count: usize,
    pub different_count: usize,
    pub error_count: usize,
}

impl ReportSummary {
    pub fn from_results(results: &[ComparisonResult]) -> Self {
        let mut pages: Vec<&str> = results.iter().map(|r| r.page.path.as_str()).collect();
        pages.sort_unstable();
        pages.dedup();
        let mut devices: Vec<&str> = results.iter().map(|r| r.viewport.name.as_str()).collect();
        devices.sort_unstable();
        devices.dedup();

        let count = |status: ComparisonStatus| {
            results.iter().filter(|r| r.status == status).count()
        };

        Self {
            pages_tested: pages.len(),
            device_types: devices.len(),
            total: results.len(),
            identical_count: count(ComparisonStatus::Identical),
            different_count: count(ComparisonStatus::Different),
            error_count: count(ComparisonStatus::Error),
        }
    }

    /// Comparisons that actually ran
    pub fn completed(&self) -> usize {
        self.identical_count + self.different_count
    }
}

/// Files written by `Report::write`
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub html: PathBuf,
    pub json: PathBuf,
}

/// The aggregated outcome of a run. Built once after every target finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub title: String,
    pub environments: Vec<String>,
    pub strategy: String,
    pub results: Vec<ComparisonResult>,
    pub summary: ReportSummary,
}

impl Report {
    pub fn new(
        title: impl Into<String>,
        environments: Vec<String>,
        strategy: impl Into<String>,
        results: Vec<ComparisonResult>,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            title: title.into(),
            environments,
            strategy: strategy.into(),
            summary: ReportSummary::from_results(&results),
            results,
        }
    }

    /// Write `{stem}.html` and `{stem}.json` into `dir`
    pub fn write(&self, dir: &Path, stem: &str, images: ImageMode) -> SiteDiffResult<ReportPaths> {
        let html_path = dir.join(format!("{}.html", stem));
        let json_path = dir.join(format!("{}.json", stem));

        let html = self.render_html(images, dir);
        std::fs::write(&html_path, html).map_err(|source| SiteDiffError::ReportWrite {
            path: html_path.clone(),
            source,
        })?;

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&json_path, json).map_err(|source| SiteDiffError::ReportWrite {
            path: json_path.clone(),
            source,
        })?;

        info!("Report written to: {}", html_path.display());
        Ok(ReportPaths {
            html: html_path,
            json: json_path,
        })
    }

    /// Render the HTML document for a report written into `report_dir`.
    /// Results are grouped by page in the order they were produced.
    pub fn render_html(&self, images: ImageMode, report_dir: &Path) -> String {
        let images = ImageRefs {
            mode: images,
            report_dir,
        };
        let mut html = String::with_capacity(16 * 1024);
        let title = escape(&self.title);

        let _ = write!(
            html,
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>{STYLE}</style>
</head>
<body>
<header>
<h1>{title}</h1>
<p class="meta">{envs} &middot; strategy: {strategy} &middot; generated {generated}</p>
</header>
"#,
            title = title,
            STYLE = STYLE,
            envs = escape(&self.environments.join(" vs ")),
            strategy = escape(&self.strategy),
            generated = self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        );

        for group in group_by_page(&self.results) {
            render_page(&mut html, group, &images);
        }

        let s = &self.summary;
        let _ = write!(
            html,
            r#"<section class="summary">
<h2>Summary</h2>
<dl>
<dt>Pages tested</dt><dd>{}</dd>
<dt>Device types</dt><dd>{}</dd>
<dt>Identical</dt><dd class="identical">{}</dd>
<dt>Different</dt><dd class="different">{}</dd>
<dt>Errors</dt><dd class="error">{}</dd>
</dl>
</section>
</body>
</html>
"#,
            s.pages_tested, s.device_types, s.identical_count, s.different_count, s.error_count
        );

        html
    }
}

fn group_by_page(results: &[ComparisonResult]) -> Vec<&[ComparisonResult]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=results.len() {
        if i == results.len() || results[i].page.path != results[start].page.path {
            groups.push(&results[start..i]);
            start = i;
        }
    }
    groups
}

fn render_page(html: &mut String, group: &[ComparisonResult], images: &ImageRefs) {
    let Some(first) = group.first() else {
        return;
    };

    let _ = write!(
        html,
        r#"<section class="page">
<h2>{path}</h2>
<ul class="urls">
<li>{env_a}: <a href="{url_a}">{url_a}</a></li>
<li>{env_b}: <a href="{url_b}">{url_b}</a></li>
</ul>
"#,
        path = escape(&first.page.path),
        env_a = escape(&first.environments.0),
        env_b = escape(&first.environments.1),
        url_a = escape(&first.urls.0),
        url_b = escape(&first.urls.1),
    );

    for result in group {
        render_card(html, result, images);
    }

    html.push_str("</section>\n");
}

fn render_card(html: &mut String, result: &ComparisonResult, images: &ImageRefs) {
    let status = result.status;
    let _ = write!(
        html,
        r#"<article class="card">
<h3>{viewport} <small>{width}&times;{height}</small> <span class="badge {class}">{badge}</span></h3>
"#,
        viewport = escape(&result.viewport.name),
        width = result.viewport.width,
        height = result.viewport.height,
        class = status_class(status),
        badge = status.badge(),
    );

    if let Some(pixels) = result.diff_pixels {
        let _ = writeln!(html, r#"<p class="detail">{} differing pixels</p>"#, pixels);
    }
    if result.baseline_created {
        html.push_str("<p class=\"detail\">Baseline created</p>\n");
    }
    if let Some(error) = &result.error {
        let _ = writeln!(html, r#"<p class="message">{}</p>"#, escape(error));
    }

    html.push_str("<div class=\"shots\">\n");
    render_figure(html, &result.environments.0, result.snapshot_path_a.as_deref(), images);
    render_figure(html, &result.environments.1, result.snapshot_path_b.as_deref(), images);
    if let Some(diff) = result.diff_image_path.as_deref() {
        render_figure(html, "diff", Some(diff), images);
    }
    html.push_str("</div>\n</article>\n");
}

fn render_figure(html: &mut String, caption: &str, path: Option<&Path>, images: &ImageRefs) {
    let source = path.and_then(|p| images.source(p));
    match source {
        Some(src) => {
            let _ = write!(
                html,
                r#"<figure><img src="{src}" alt="{caption}" loading="lazy"><figcaption>{caption}</figcaption></figure>
"#,
                src = src,
                caption = escape(caption),
            );
        }
        None => {
            let _ = write!(
                html,
                r#"<figure><div class="missing">No screenshot</div><figcaption>{}</figcaption></figure>
"#,
                escape(caption)
            );
        }
    }
}

struct ImageRefs<'a> {
    mode: ImageMode,
    report_dir: &'a Path,
}

impl ImageRefs<'_> {
    fn source(&self, path: &Path) -> Option<String> {
        match self.mode {
            ImageMode::Embed => std::fs::read(path)
                .ok()
                .map(|bytes| format!("data:image/png;base64,{}", BASE64.encode(bytes))),
            ImageMode::Link => {
                let link = match relative_path(path, self.report_dir) {
                    Some(rel) => rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/"),
                    None => path.display().to_string(),
                };
                Some(escape(&link))
            }
        }
    }
}

/// `path` expressed relative to `base`. Both are resolved against the
/// current directory first; `None` when they share no root.
fn relative_path(path: &Path, base: &Path) -> Option<PathBuf> {
    if let Ok(rel) = path.strip_prefix(base) {
        return Some(rel.to_path_buf());
    }

    let cwd = std::env::current_dir().ok()?;
    let (path, base) = (cwd.join(path), cwd.join(base));
    let path = components(&path);
    let base = components(&base);

    let common = path.iter().zip(&base).take_while(|(a, b)| a == b).count();
    if common == 0 {
        return None;
    }

    let mut rel = PathBuf::new();
    for _ in common..base.len() {
        rel.push("..");
    }
    for component in &path[common..] {
        rel.push(component.as_os_str());
    }
    Some(rel)
}

fn components(path: &Path) -> Vec<Component<'_>> {
    path.components()
        .filter(|c| *c != Component::CurDir)
        .collect()
}

fn status_class(status: ComparisonStatus) -> &'static str {
    match status {
        ComparisonStatus::Identical => "identical",
        ComparisonStatus::Different => "different",
        ComparisonStatus::Error => "error",
    }
}

/// Escape text for HTML element content and attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = r#"
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; margin: 0 auto; max-width: 1600px; padding: 24px; color: #1f2328; background: #f6f8fa; }
header h1 { margin-bottom: 4px; }
.meta { color: #59636e; margin-top: 0; }
.page { background: #fff; border: 1px solid #d1d9e0; border-radius: 8px; margin: 24px 0; padding: 16px 24px; }
.urls { color: #59636e; font-size: 14px; padding-left: 18px; }
.card { border-top: 1px solid #d1d9e0; padding: 16px 0; }
.card h3 small { color: #59636e; font-weight: normal; }
.badge { border-radius: 12px; color: #fff; font-size: 12px; padding: 2px 10px; vertical-align: middle; }
.badge.identical { background: #1a7f37; }
.badge.different { background: #cf222e; }
.badge.error { background: #9a6700; }
.detail { color: #59636e; margin: 4px 0; }
.message { background: #fff8c5; border-radius: 4px; font-family: monospace; padding: 8px; }
.shots { display: flex; gap: 16px; align-items: flex-start; }
.shots figure { flex: 1; margin: 0; min-width: 0; }
.shots img { border: 1px solid #d1d9e0; width: 100%; }
.shots figcaption { color: #59636e; font-size: 13px; text-align: center; }
.missing { align-items: center; background: #eaeef2; color: #59636e; display: flex; height: 200px; justify-content: center; }
.summary { background: #fff; border: 1px solid #d1d9e0; border-radius: 8px; padding: 16px 24px; }
.summary dl { display: grid; grid-template-columns: max-content auto; gap: 4px 24px; }
.summary dd { margin: 0; font-weight: 600; }
dd.identical { color: #1a7f37; }
dd.different { color: #cf222e; }
dd.error { color: #9a6700; }
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use sitediff_common::{PageRef, ViewportProfile};

    fn result(path: &str, viewport: &str, status: ComparisonStatus) -> ComparisonResult {
        let id = if path == "/" { "home" } else { path.trim_matches('/') };
        ComparisonResult {
            page: PageRef {
                path: path.to_string(),
                id: id.to_string(),
            },
            viewport: ViewportProfile::new(viewport, 375, 667),
            environments: ("production".to_string(), "development".to_string()),
            urls: (
                format!("https://www.example.com{}", path),
                format!("https://dev.example.com{}", path),
            ),
            status,
            identical: status == ComparisonStatus::Identical,
            strategy: "exact".to_string(),
            snapshot_path_a: None,
            snapshot_path_b: None,
            sha256_a: None,
            sha256_b: None,
            diff_pixels: None,
            diff_image_path: None,
            baseline_created: false,
            error: None,
            error_kind: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_summary_counts() {
        let results = vec![
            result("/", "desktop", ComparisonStatus::Identical),
            result("/", "mobile", ComparisonStatus::Different),
            result("/contact/", "desktop", ComparisonStatus::Error),
            result("/contact/", "mobile", ComparisonStatus::Identical),
        ];
        let summary = ReportSummary::from_results(&results);
        assert_eq!(summary.pages_tested, 2);
        assert_eq!(summary.device_types, 2);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.identical_count, 2);
        assert_eq!(summary.different_count, 1);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.completed(), 3);
    }

    #[test]
    fn test_groups_consecutive_pages() {
        let results = vec![
            result("/", "desktop", ComparisonStatus::Identical),
            result("/", "mobile", ComparisonStatus::Identical),
            result("/contact/", "desktop", ComparisonStatus::Identical),
        ];
        let groups = group_by_page(&results);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert!(group_by_page(&[]).is_empty());
    }

    #[test]
    fn test_html_escapes_interpolated_text() {
        let mut failing = result("/search/", "mobile", ComparisonStatus::Error);
        failing.error = Some("<script>alert('x')</script> & more".to_string());
        let report = Report::new(
            "Visual comparison",
            vec!["production".into(), "development".into()],
            "exact",
            vec![failing],
        );

        let html = report.render_html(ImageMode::Embed, Path::new("."));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; more"));
        assert!(html.contains(r#"<span class="badge error">ERROR</span>"#));
        assert!(html.contains("No screenshot"));
    }

    #[test]
    fn test_embed_and_link_modes() {
        let dir = tempfile::tempdir().unwrap();
        let shot = dir.path().join("report-mobile-home-production.png");
        std::fs::write(&shot, b"\x89PNG").unwrap();

        let mut r = result("/", "mobile", ComparisonStatus::Identical);
        r.snapshot_path_a = Some(shot);
        let report = Report::new("t", vec![], "exact", vec![r]);

        let embedded = report.render_html(ImageMode::Embed, dir.path());
        assert!(embedded.contains("data:image/png;base64,iVBORw=="));

        let linked = report.render_html(ImageMode::Link, dir.path());
        assert!(linked.contains(r#"src="report-mobile-home-production.png""#));
    }

    #[test]
    fn test_relative_path_between_directories() {
        let out = Path::new("/srv/sitediff/out");
        assert_eq!(
            relative_path(Path::new("/srv/sitediff/out/baselines/desktop-home.png"), out),
            Some(PathBuf::from("baselines/desktop-home.png"))
        );
        assert_eq!(
            relative_path(Path::new("/srv/approved/desktop-home.png"), out),
            Some(PathBuf::from("../../approved/desktop-home.png"))
        );
        assert_eq!(
            relative_path(
                Path::new("screenshots/baselines/mobile-home.png"),
                Path::new("screenshots")
            ),
            Some(PathBuf::from("baselines/mobile-home.png"))
        );
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let report = Report::new("t", vec![], "exact", vec![]);
        let err = report
            .write(&dir.path().join("absent"), "report", ImageMode::Embed)
            .unwrap_err();
        assert!(matches!(err, SiteDiffError::ReportWrite { .. }));
    }
}
