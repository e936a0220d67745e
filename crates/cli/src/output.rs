//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use sitediff_common::{ComparisonResult, ComparisonStatus};
use sitediff_runner::RunOutcome;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("No items found.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
    }
}

/// One comparison result as shown in the run summary
#[derive(Serialize)]
pub struct ResultDisplay {
    pub page: String,
    pub viewport: String,
    pub status: ComparisonStatus,
    pub diff_pixels: Option<u64>,
    pub detail: String,
}

impl From<&ComparisonResult> for ResultDisplay {
    fn from(result: &ComparisonResult) -> Self {
        let detail = match (&result.error, result.baseline_created) {
            (Some(error), _) => error.clone(),
            (None, true) => "baseline written".to_string(),
            (None, false) => String::new(),
        };
        Self {
            page: result.page.path.clone(),
            viewport: result.viewport.name.clone(),
            status: result.status,
            diff_pixels: result.diff_pixels,
            detail,
        }
    }
}

impl TableDisplay for ResultDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Page", "Viewport", "Status", "Diff px", "Detail"]
    }

    fn row(&self) -> Vec<String> {
        let status = match self.status {
            ComparisonStatus::Identical => "✓ IDENTICAL".green().to_string(),
            ComparisonStatus::Different => "✗ DIFFERENT".red().to_string(),
            ComparisonStatus::Error => "! ERROR".yellow().to_string(),
        };
        vec![
            self.page.clone(),
            self.viewport.clone(),
            status,
            self.diff_pixels.map(|p| p.to_string()).unwrap_or_default(),
            self.detail.clone(),
        ]
    }
}

#[derive(Serialize)]
struct OutcomeJson<'a> {
    summary: &'a sitediff_runner::ReportSummary,
    report_html: String,
    report_json: String,
    duration_ms: u64,
    results: Vec<ResultDisplay>,
}

/// Print the per-target results and the run summary
pub fn print_outcome(outcome: &RunOutcome, format: OutputFormat) {
    let results: Vec<ResultDisplay> = outcome
        .report
        .results
        .iter()
        .map(ResultDisplay::from)
        .collect();

    match format {
        OutputFormat::Table => {
            print_list(&results, format);

            let s = &outcome.report.summary;
            println!();
            println!(
                "  Pages tested: {}   Device types: {}",
                s.pages_tested, s.device_types
            );
            println!(
                "  {} identical   {} different   {} error(s)",
                s.identical_count.to_string().green().bold(),
                s.different_count.to_string().red().bold(),
                s.error_count.to_string().yellow().bold()
            );
            println!("  Report: {}", outcome.paths.html.display().to_string().dimmed());

            if s.different_count == 0 && s.error_count == 0 {
                print_success("No visual differences");
            } else if s.different_count > 0 {
                print_warning(&format!("{} visual difference(s) found", s.different_count));
            }
        }
        OutputFormat::Json => {
            let json = OutcomeJson {
                summary: &outcome.report.summary,
                report_html: outcome.paths.html.display().to_string(),
                report_json: outcome.paths.json.display().to_string(),
                duration_ms: outcome.duration_ms,
                results,
            };
            println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        }
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitediff_common::{PageRef, ViewportProfile};

    #[test]
    fn test_result_display_prefers_error_detail() {
        let result = ComparisonResult {
            page: PageRef {
                path: "/contact/".to_string(),
                id: "contact".to_string(),
            },
            viewport: ViewportProfile::new("tablet", 768, 1024),
            environments: ("production".to_string(), "development".to_string()),
            urls: (String::new(), String::new()),
            status: ComparisonStatus::Error,
            identical: false,
            strategy: "exact".to_string(),
            snapshot_path_a: None,
            snapshot_path_b: None,
            sha256_a: None,
            sha256_b: None,
            diff_pixels: None,
            diff_image_path: None,
            baseline_created: false,
            error: Some(
                "Navigation to https://dev.example.com/contact/ failed: net::ERR_NAME_NOT_RESOLVED"
                    .to_string(),
            ),
            error_kind: Some("navigation".to_string()),
            timestamp: chrono::Utc::now(),
        };

        let display = ResultDisplay::from(&result);
        assert!(display.detail.contains("ERR_NAME_NOT_RESOLVED"));
        assert_eq!(display.row().len(), ResultDisplay::headers().len());
    }
}
