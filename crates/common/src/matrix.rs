//! Target matrix: pages × viewports × environments

use std::collections::HashMap;

use crate::config::RunConfig;
use crate::error::{SiteDiffError, SiteDiffResult};
use crate::types::{CaptureTask, Environment, PageTarget, ViewportProfile};

/// One (page, viewport) pair, captured once per environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub page: PageTarget,
    pub viewport: ViewportProfile,
}

impl Target {
    /// Identity shared by every environment's capture of this target
    pub fn key(&self) -> String {
        crate::types::target_key(&self.viewport, &self.page.page_id())
    }
}

/// The ordered set of capture tasks for a run
#[derive(Debug, Clone)]
pub struct TargetMatrix {
    environments: Vec<Environment>,
    targets: Vec<Target>,
}

impl TargetMatrix {
    /// Build the matrix over the given environments, in the given order.
    ///
    /// Fails when two distinct tasks would share a naming key, since their
    /// output files would overwrite each other.
    pub fn build(config: &RunConfig, environments: Vec<Environment>) -> SiteDiffResult<Self> {
        if environments.is_empty() {
            return Err(SiteDiffError::InvalidConfig(
                "no environment selected for capture".to_string(),
            ));
        }

        let mut targets = Vec::with_capacity(config.pages.len() * config.viewports.len());
        for page in &config.pages {
            for viewport in &config.viewports {
                targets.push(Target {
                    page: page.clone(),
                    viewport: viewport.clone(),
                });
            }
        }

        let matrix = Self {
            environments,
            targets,
        };
        matrix.check_unique_keys()?;
        Ok(matrix)
    }

    /// Matrix over the configured comparison pair (A, B)
    pub fn for_comparison(config: &RunConfig) -> SiteDiffResult<Self> {
        let (a, b) = config.comparison_pair()?;
        Self::build(config, vec![a.clone(), b.clone()])
    }

    /// Matrix over a single named environment
    pub fn for_environment(config: &RunConfig, name: &str) -> SiteDiffResult<Self> {
        let env = config.environment(name).ok_or_else(|| {
            SiteDiffError::InvalidConfig(format!("environment '{}' is not defined", name))
        })?;
        Self::build(config, vec![env.clone()])
    }

    fn check_unique_keys(&self) -> SiteDiffResult<()> {
        let mut seen: HashMap<String, String> = HashMap::new();
        for task in self.tasks()? {
            let key = task.naming_key();
            let description = task.to_string();
            if let Some(previous) = seen.insert(key.clone(), description.clone()) {
                return Err(SiteDiffError::DuplicateTarget(format!(
                    "'{}' and '{}' both map to '{}'",
                    previous, description, key
                )));
            }
        }
        Ok(())
    }

    pub fn environments(&self) -> &[Environment] {
        &self.environments
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Tasks for a single target, one per environment
    pub fn tasks_for(&self, target: &Target) -> SiteDiffResult<Vec<CaptureTask>> {
        self.environments
            .iter()
            .map(|env| CaptureTask::new(target.page.clone(), target.viewport.clone(), env.clone()))
            .collect()
    }

    /// Every task: page-major, then viewport, then environment
    pub fn tasks(&self) -> SiteDiffResult<Vec<CaptureTask>> {
        let mut tasks = Vec::with_capacity(self.len());
        for target in &self.targets {
            tasks.extend(self.tasks_for(target)?);
        }
        Ok(tasks)
    }

    /// Number of capture tasks
    pub fn len(&self) -> usize {
        self.targets.len() * self.environments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn config(pages: &[&str]) -> RunConfig {
        RunConfig {
            pages: pages.iter().map(|p| PageTarget::new(*p).unwrap()).collect(),
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_matrix_is_cross_product_in_order() {
        let config = config(&["/", "/communities/eagle/"]);
        let matrix = TargetMatrix::for_comparison(&config).unwrap();
        let tasks = matrix.tasks().unwrap();

        // 2 pages × 3 viewports × 2 environments
        assert_eq!(tasks.len(), 12);
        assert_eq!(matrix.len(), 12);
        assert_eq!(tasks[0].naming_key(), "desktop-home-production");
        assert_eq!(tasks[1].naming_key(), "desktop-home-development");
        assert_eq!(tasks[2].naming_key(), "tablet-home-production");
        assert_eq!(tasks[11].naming_key(), "mobile-communities-eagle-development");
        assert_eq!(
            tasks[11].url.as_str(),
            "https://dev.example.com/communities/eagle/"
        );
    }

    #[test]
    fn test_naming_keys_are_unique() {
        let config = config(&["/", "/about/", "/communities/", "/communities/eagle/"]);
        let matrix = TargetMatrix::for_comparison(&config).unwrap();
        let tasks = matrix.tasks().unwrap();
        let keys: HashSet<String> = tasks.iter().map(|t| t.naming_key()).collect();
        assert_eq!(keys.len(), tasks.len());
    }

    #[test]
    fn test_colliding_page_ids_are_rejected() {
        let config = config(&["/a-b/", "/a/b/"]);
        let err = TargetMatrix::for_comparison(&config).unwrap_err();
        assert!(matches!(err, SiteDiffError::DuplicateTarget(_)));
    }

    #[test]
    fn test_single_environment_matrix() {
        let config = config(&["/"]);
        let matrix = TargetMatrix::for_environment(&config, "development").unwrap();
        assert_eq!(matrix.len(), 3);
        assert!(TargetMatrix::for_environment(&config, "staging").is_err());
    }
}
