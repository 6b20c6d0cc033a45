//! Run a single named task.

use anyhow::Result;
use kiln_core::TaskId;
use kiln_tasks::ReleaseOptions;

use super::Project;

pub async fn run(project: &Project, id: TaskId) -> Result<()> {
    let reports = project.run_plan(ReleaseOptions::default(), &[id]).await?;

    let written: usize = reports.iter().map(|(_, r)| r.written.len()).sum();
    let skipped: usize = reports.iter().map(|(_, r)| r.skipped).sum();
    tracing::info!(task = %id, written, skipped, "Done");

    Ok(())
}
