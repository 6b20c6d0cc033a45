//! Release build: clean, then assemble.

use std::time::Instant;

use anyhow::{Context, Result};
use kiln_core::TaskId;
use kiln_tasks::ReleaseOptions;

use super::Project;

/// Run the release plan. With `full`, every asset builder runs first.
pub async fn run(project: &Project, full: bool, allow_incomplete: bool) -> Result<()> {
    tracing::info!("Building release...");
    let start = Instant::now();

    let options = ReleaseOptions {
        allow_incomplete,
        full,
    };
    let reports = project.run_plan(options, &[TaskId::Assemble]).await?;

    let files = reports
        .iter()
        .find(|(id, _)| *id == TaskId::Assemble)
        .map(|(_, report)| report.written.len())
        .unwrap_or(0);

    tracing::info!(
        "Released {} files in {}ms",
        files,
        start.elapsed().as_millis()
    );
    tracing::info!("Output: {}", project.layout.dist.display());

    Ok(())
}

/// `buildApp`: copy built artifacts into the release directory without
/// cleaning it first.
pub async fn assemble(project: &Project, allow_incomplete: bool) -> Result<()> {
    let options = ReleaseOptions {
        allow_incomplete,
        full: false,
    };
    let registry = project.registry(options)?;
    let ctx = project.context();

    let report = tokio::task::spawn_blocking(move || registry.run(TaskId::Assemble, &ctx))
        .await
        .context("Task worker panicked")??;
    tracing::info!("Copied {} files to {}", report.written.len(), project.layout.dist.display());

    Ok(())
}
