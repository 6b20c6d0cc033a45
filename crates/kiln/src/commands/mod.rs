//! CLI command implementations.

pub mod build;
pub mod default;
pub mod init;
pub mod serve;
pub mod task;
pub mod watch;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kiln_core::{KilnConfig, Layout, TaskContext, TaskId, TaskReport};
use kiln_tasks::{ReleaseOptions, TaskRegistry};

/// Configuration and directory layout for one invocation.
#[derive(Debug, Clone)]
pub struct Project {
    pub config: KilnConfig,
    pub layout: Layout,
}

impl Project {
    /// Directory that relative `[paths]` resolve against: the config file's.
    pub fn base_dir(config_path: &Path) -> PathBuf {
        config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn load(config_path: &Path) -> Result<Self> {
        let config = KilnConfig::load(config_path)?;
        let layout = Layout::from_config(&Self::base_dir(config_path), &config.paths);
        Ok(Self { config, layout })
    }

    pub fn context(&self) -> TaskContext {
        TaskContext::new(self.layout.clone(), self.config.clone())
    }

    pub fn registry(&self, options: ReleaseOptions) -> Result<TaskRegistry> {
        TaskRegistry::standard(options).context("Invalid task graph")
    }

    /// Run `requested` with its dependencies on a blocking worker.
    pub async fn run_plan(
        &self,
        options: ReleaseOptions,
        requested: &[TaskId],
    ) -> Result<Vec<(TaskId, TaskReport)>> {
        let registry = self.registry(options)?;
        let ctx = self.context();
        let requested = requested.to_vec();

        let reports = tokio::task::spawn_blocking(move || registry.run_plan(&requested, &ctx))
            .await
            .context("Task worker panicked")??;
        Ok(reports)
    }
}
