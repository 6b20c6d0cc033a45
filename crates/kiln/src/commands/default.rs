//! Default command: build every asset while serving and watching.

use anyhow::Result;
use kiln_core::TaskId;
use kiln_server::{DevServer, DevServerConfig, TaskRunner, WatchCoordinator};
use kiln_tasks::ReleaseOptions;

use super::Project;

pub async fn run(project: &Project) -> Result<()> {
    let registry = project.registry(ReleaseOptions::default())?;
    let ctx = project.context();

    let server_config = DevServerConfig::from_config(&project.layout.root, &project.config.server);
    let server = DevServer::new(server_config, ctx.reload.clone());
    let coordinator = WatchCoordinator::new(registry, ctx)?;

    // Initial builds share the watcher's runner, so a change made while a
    // builder is still running queues behind it instead of racing it.
    start_builds(coordinator.runner());

    tokio::select! {
        result = server.start() => result?,
        result = coordinator.watch() => result?,
    }

    Ok(())
}

/// Start every asset builder in the background. Failures are logged by the
/// registry and do not stop the server or the watcher.
fn start_builds(runner: &TaskRunner) {
    for id in TaskId::ASSETS {
        runner.trigger(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use kiln_core::{KilnConfig, Layout, Task, TaskContext, TaskError, TaskReport};
    use kiln_server::LIVERELOAD_SCRIPT_PATH;
    use kiln_tasks::{HtmlTask, TaskRegistry};
    use std::fs;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    /// Blocks until the test releases it.
    struct Stuck {
        id: TaskId,
        release: Arc<Mutex<std::sync::mpsc::Receiver<()>>>,
    }

    impl Task for Stuck {
        fn id(&self) -> TaskId {
            self.id
        }

        fn run(&self, _ctx: &TaskContext) -> Result<TaskReport, TaskError> {
            let _ = self.release.lock().unwrap().recv();
            Ok(TaskReport::default())
        }
    }

    fn site() -> (tempfile::TempDir, TaskContext) {
        let temp = tempdir().unwrap();
        let layout = Layout::new(temp.path().join("app"), temp.path().join("dist"));
        fs::create_dir_all(layout.pages_dir()).unwrap();
        fs::write(layout.pages_dir().join("index.html"), "<h1>Home</h1>").unwrap();
        let mut config = KilnConfig::default();
        config.watch.debounce_ms = 20;
        (temp, TaskContext::new(layout, config))
    }

    #[tokio::test]
    async fn hung_builder_does_not_hold_back_server_or_watcher() {
        let (_temp, ctx) = site();
        let (release, stuck) = std::sync::mpsc::channel();
        let stuck: Arc<dyn Task> = Arc::new(Stuck {
            id: TaskId::Images,
            release: Arc::new(Mutex::new(stuck)),
        });
        let html: Arc<dyn Task> = Arc::new(HtmlTask);
        let registry = TaskRegistry::from_tasks(vec![stuck, html]).unwrap();

        let server = DevServer::new(
            DevServerConfig::from_config(&ctx.layout.root, &ctx.config.server),
            ctx.reload.clone(),
        );
        let coordinator = WatchCoordinator::new(registry, ctx.clone()).unwrap();
        start_builds(coordinator.runner());

        // The server answers while images is still stuck.
        let response = tokio::time::timeout(
            Duration::from_secs(2),
            server
                .router()
                .oneshot(Request::get(LIVERELOAD_SCRIPT_PATH).body(Body::empty()).unwrap()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The watcher dispatches changes made during the initial build.
        let page = ctx.layout.pages_dir().join("about.html");
        fs::write(&page, "<h1>About</h1>").unwrap();
        let (tx, rx) = mpsc::channel(4);
        tx.send(page).await.unwrap();
        drop(tx);
        coordinator.run(rx).await;

        let about = ctx.layout.root.join("about.html");
        for _ in 0..200 {
            if about.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(about.exists());
        assert!(!coordinator.runner().is_idle());

        release.send(()).unwrap();
    }
}
