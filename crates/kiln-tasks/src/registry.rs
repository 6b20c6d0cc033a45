//! The fixed set of named tasks and their dependency graph.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use kiln_core::{GraphError, Task, TaskContext, TaskError, TaskGraph, TaskId, TaskReport};

use crate::assemble::{AssembleTask, ReleaseOptions};
use crate::clean::CleanTask;
use crate::fonts::FontsTask;
use crate::html::HtmlTask;
use crate::images::ImagesTask;
use crate::scripts::ScriptsTask;
use crate::styles::StylesTask;

/// Failure of a task invocation.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("{task} failed: {source}")]
    Task {
        task: TaskId,
        #[source]
        source: TaskError,
    },
}

/// Task definitions, built once at startup.
#[derive(Clone)]
pub struct TaskRegistry {
    tasks: BTreeMap<TaskId, Arc<dyn Task>>,
    graph: TaskGraph,
}

impl TaskRegistry {
    /// Every standard task, with release assembly configured by `options`.
    pub fn standard(options: ReleaseOptions) -> Result<Self, GraphError> {
        Self::from_tasks(vec![
            Arc::new(HtmlTask),
            Arc::new(StylesTask),
            Arc::new(FontsTask),
            Arc::new(ImagesTask),
            Arc::new(ScriptsTask),
            Arc::new(CleanTask),
            Arc::new(AssembleTask::new(options)),
        ])
    }

    pub fn from_tasks(tasks: Vec<Arc<dyn Task>>) -> Result<Self, GraphError> {
        let graph = TaskGraph::from_tasks(tasks.iter().map(|t| t.as_ref()))?;
        let tasks = tasks.into_iter().map(|t| (t.id(), t)).collect();
        Ok(Self { tasks, graph })
    }

    pub fn get(&self, id: TaskId) -> Option<Arc<dyn Task>> {
        self.tasks.get(&id).cloned()
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Run one task on its own, ignoring its dependencies.
    pub fn run(&self, id: TaskId, ctx: &TaskContext) -> Result<TaskReport, RunError> {
        let task = self.get(id).ok_or(GraphError::UnknownTask(id))?;

        tracing::info!(task = %id, "Starting");
        let start = Instant::now();
        match task.run(ctx) {
            Ok(report) => {
                tracing::info!(
                    task = %id,
                    written = report.written.len(),
                    skipped = report.skipped,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Finished"
                );
                Ok(report)
            }
            Err(source) => {
                tracing::error!(task = %id, error = %source, "Failed");
                Err(RunError::Task { task: id, source })
            }
        }
    }

    /// Run `requested` and everything they depend on, strictly in plan order.
    ///
    /// Stops at the first failure.
    pub fn run_plan(
        &self,
        requested: &[TaskId],
        ctx: &TaskContext,
    ) -> Result<Vec<(TaskId, TaskReport)>, RunError> {
        let plan = self.graph.plan(requested)?;
        tracing::debug!(plan = ?plan, "Planned tasks");

        plan.into_iter()
            .map(|id| self.run(id, ctx).map(|report| (id, report)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{KilnConfig, Layout};
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct Recording {
        id: TaskId,
        deps: Vec<TaskId>,
        log: Arc<Mutex<Vec<TaskId>>>,
        fail: bool,
    }

    impl Task for Recording {
        fn id(&self) -> TaskId {
            self.id
        }

        fn deps(&self) -> &[TaskId] {
            &self.deps
        }

        fn run(&self, _ctx: &TaskContext) -> Result<TaskReport, TaskError> {
            self.log.lock().unwrap().push(self.id);
            if self.fail {
                return Err(TaskError::Config("boom".to_string()));
            }
            Ok(TaskReport::default())
        }
    }

    fn recording(
        log: &Arc<Mutex<Vec<TaskId>>>,
        id: TaskId,
        deps: &[TaskId],
        fail: bool,
    ) -> Arc<dyn Task> {
        Arc::new(Recording {
            id,
            deps: deps.to_vec(),
            log: Arc::clone(log),
            fail,
        })
    }

    fn ctx() -> (tempfile::TempDir, TaskContext) {
        let temp = tempdir().unwrap();
        let layout = Layout::new(temp.path().join("app"), temp.path().join("dist"));
        (temp, TaskContext::new(layout, KilnConfig::default()))
    }

    #[test]
    fn standard_release_plan_cleans_first() {
        let registry = TaskRegistry::standard(ReleaseOptions::default()).unwrap();
        assert_eq!(
            registry.graph().plan(&[TaskId::Assemble]).unwrap(),
            vec![TaskId::Clean, TaskId::Assemble]
        );
    }

    #[test]
    fn full_release_plan_builds_before_assembling() {
        let registry = TaskRegistry::standard(ReleaseOptions {
            allow_incomplete: false,
            full: true,
        })
        .unwrap();

        let plan = registry.graph().plan(&[TaskId::Assemble]).unwrap();

        assert_eq!(plan.len(), 7);
        assert_eq!(plan.last(), Some(&TaskId::Assemble));
    }

    #[test]
    fn runs_dependencies_first_and_stops_on_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = TaskRegistry::from_tasks(vec![
            recording(&log, TaskId::Clean, &[], false),
            recording(&log, TaskId::Styles, &[], true),
            recording(&log, TaskId::Assemble, &[TaskId::Clean, TaskId::Styles], false),
        ])
        .unwrap();
        let (_temp, ctx) = ctx();

        let err = registry.run_plan(&[TaskId::Assemble], &ctx).unwrap_err();

        assert!(matches!(err, RunError::Task { task: TaskId::Styles, .. }));
        let ran = log.lock().unwrap().clone();
        assert!(ran.contains(&TaskId::Styles));
        assert!(!ran.contains(&TaskId::Assemble));
    }

    #[test]
    fn rejects_unknown_dependencies() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let result = TaskRegistry::from_tasks(vec![recording(
            &log,
            TaskId::Assemble,
            &[TaskId::Clean],
            false,
        )]);
        assert!(matches!(
            result,
            Err(GraphError::UnknownDependency { task: TaskId::Assemble, dep: TaskId::Clean })
        ));
    }

    #[test]
    fn build_composite_produces_release() {
        let (_temp, ctx) = ctx();
        for (rel, body) in [
            ("index.html", "<html></html>"),
            ("css/style.min.css", "a{}"),
            ("js/main.min.js", "1"),
        ] {
            let path = ctx.layout.root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        }
        fs::create_dir_all(ctx.layout.dist.join("stale")).unwrap();

        let registry = TaskRegistry::standard(ReleaseOptions::default()).unwrap();
        let reports = registry.run_plan(&[TaskId::Assemble], &ctx).unwrap();

        assert_eq!(reports.len(), 2);
        assert!(!ctx.layout.dist.join("stale").exists());
        assert!(ctx.layout.dist.join("css/style.min.css").exists());
    }
}
