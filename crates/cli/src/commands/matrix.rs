//! Capture task listing

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;

use sitediff_common::{CaptureTask, TargetMatrix};
use sitediff_runner::store::REPORT_PREFIX;

use super::load_config;
use crate::output::{print_list, OutputFormat, TableDisplay};

/// One capture task as shown to the user
#[derive(Serialize)]
pub struct TaskDisplay {
    pub page: String,
    pub page_id: String,
    pub viewport: String,
    pub size: String,
    pub environment: String,
    pub url: String,
    pub file: String,
}

impl From<&CaptureTask> for TaskDisplay {
    fn from(task: &CaptureTask) -> Self {
        Self {
            page: task.page.path().to_string(),
            page_id: task.page.page_id(),
            viewport: task.viewport.name.clone(),
            size: format!("{}x{}", task.viewport.width, task.viewport.height),
            environment: task.environment.name.clone(),
            url: task.url.to_string(),
            file: format!("{}{}.png", REPORT_PREFIX, task.naming_key()),
        }
    }
}

impl TableDisplay for TaskDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Page", "Viewport", "Size", "Environment", "URL", "File"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.page.clone(),
            self.viewport.clone(),
            self.size.clone(),
            self.environment.clone(),
            self.url.clone(),
            self.file.clone(),
        ]
    }
}

pub fn execute(config: Option<&Path>, format: OutputFormat) -> Result<ExitCode> {
    let config = load_config(config)?;
    let matrix = TargetMatrix::for_comparison(&config)?;
    let tasks: Vec<TaskDisplay> = matrix.tasks()?.iter().map(TaskDisplay::from).collect();
    print_list(&tasks, format);
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitediff_common::RunConfig;

    #[test]
    fn test_task_display_of_default_matrix() {
        let matrix = TargetMatrix::for_comparison(&RunConfig::default()).unwrap();
        let tasks = matrix.tasks().unwrap();
        let first = TaskDisplay::from(&tasks[0]);

        assert_eq!(first.page, "/");
        assert_eq!(first.page_id, "home");
        assert_eq!(first.size, "1920x1080");
        assert_eq!(first.url, "https://www.example.com/");
        assert_eq!(first.file, "report-desktop-home-production.png");
        assert_eq!(first.row().len(), TaskDisplay::headers().len());
    }
}
