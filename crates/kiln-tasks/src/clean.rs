//! Remove the distributable tree.

use std::fs;
use std::io::ErrorKind;
use std::time::Instant;

use kiln_core::{Task, TaskContext, TaskError, TaskId, TaskReport};

/// Deletes `dist/` recursively. Nothing to delete is success.
#[derive(Debug, Default)]
pub struct CleanTask;

impl Task for CleanTask {
    fn id(&self) -> TaskId {
        TaskId::Clean
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        let dist = &ctx.layout.dist;

        match fs::remove_dir_all(dist) {
            Ok(()) => tracing::info!(dir = %dist.display(), "Cleaned distributable directory"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(dir = %dist.display(), "Nothing to clean");
            }
            Err(e) => return Err(TaskError::io(dist, e)),
        }

        Ok(TaskReport {
            duration_ms: start.elapsed().as_millis() as u64,
            ..TaskReport::default()
        })
    }
}
