//! Watch command.

use anyhow::Result;
use kiln_server::WatchCoordinator;
use kiln_tasks::ReleaseOptions;

use super::Project;

/// Rebuild on change until Ctrl-C.
pub async fn run(project: &Project) -> Result<()> {
    let registry = project.registry(ReleaseOptions::default())?;
    let coordinator = WatchCoordinator::new(registry, project.context())?;

    tokio::select! {
        result = coordinator.watch() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Stopped watching"),
    }

    Ok(())
}
