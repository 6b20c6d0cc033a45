//! Watch coordinator: file changes in, task runs and reloads out.
//!
//! Raw change events are collected for one debounce window, mapped through
//! the glob bindings, and dispatched once per distinct action. Each task is
//! single-flight: a trigger that arrives while it runs queues at most one
//! follow-up run.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::sync::mpsc;

use kiln_core::{ReloadBus, ReloadMessage, TaskContext, TaskId};
use kiln_tasks::TaskRegistry;

use crate::server::ServerError;
use crate::watcher::FileWatcher;

/// What a matching change causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    /// Tell browsers to reload, build nothing
    Reload,
    Run(TaskId),
}

/// Glob patterns (relative to the source root) bound to actions.
#[derive(Debug, Clone)]
pub struct Bindings {
    set: GlobSet,
    actions: Vec<Action>,
}

impl Bindings {
    pub fn new(bindings: &[(&str, Action)]) -> Result<Self, ServerError> {
        let mut builder = GlobSetBuilder::new();
        let mut actions = Vec::with_capacity(bindings.len());
        for (pattern, action) in bindings {
            let glob = Glob::new(pattern)
                .map_err(|e| ServerError::Watch(format!("invalid pattern '{pattern}': {e}")))?;
            builder.add(glob);
            actions.push(*action);
        }
        let set = builder
            .build()
            .map_err(|e| ServerError::Watch(e.to_string()))?;
        Ok(Self { set, actions })
    }

    /// The default source tree bindings.
    pub fn standard() -> Result<Self, ServerError> {
        Self::new(&[
            ("**/*.html", Action::Reload),
            ("components/**/*.html", Action::Run(TaskId::Html)),
            ("pages/*.html", Action::Run(TaskId::Html)),
            ("scss/**/*.scss", Action::Run(TaskId::Styles)),
            ("images/src/**", Action::Run(TaskId::Images)),
            ("fonts/src/**", Action::Run(TaskId::Fonts)),
            ("js/main.js", Action::Run(TaskId::Scripts)),
        ])
    }

    /// Actions bound to a path relative to the source root.
    pub fn actions_for(&self, relative: &Path) -> BTreeSet<Action> {
        self.set
            .matches(relative)
            .into_iter()
            .map(|i| self.actions[i])
            .collect()
    }
}

/// Outcome of [`TaskRunner::trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The task was idle and is now running
    Started,
    /// The task is running; one more run will follow it
    Queued,
    /// A follow-up run was already queued
    Coalesced,
}

#[derive(Debug, Default)]
struct Flight {
    running: bool,
    pending: bool,
}

/// Runs tasks on blocking workers, at most one instance per task.
#[derive(Clone)]
pub struct TaskRunner {
    registry: TaskRegistry,
    ctx: TaskContext,
    flights: Arc<Mutex<HashMap<TaskId, Flight>>>,
}

impl TaskRunner {
    pub fn new(registry: TaskRegistry, ctx: TaskContext) -> Self {
        Self {
            registry,
            ctx,
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Request a run of `id`. Must be called from within a tokio runtime.
    pub fn trigger(&self, id: TaskId) -> Trigger {
        {
            let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
            let flight = flights.entry(id).or_default();
            if flight.running {
                if flight.pending {
                    return Trigger::Coalesced;
                }
                flight.pending = true;
                return Trigger::Queued;
            }
            flight.running = true;
        }

        let runner = self.clone();
        tokio::spawn(async move { runner.fly(id).await });
        Trigger::Started
    }

    /// True when no task is running or queued.
    pub fn is_idle(&self) -> bool {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .all(|f| !f.running && !f.pending)
    }

    async fn fly(self, id: TaskId) {
        loop {
            let registry = self.registry.clone();
            let ctx = self.ctx.clone();
            let joined = tokio::task::spawn_blocking(move || registry.run(id, &ctx)).await;
            if let Err(e) = joined {
                tracing::error!(task = %id, error = %e, "Task worker panicked");
            }
            // Task failures are already logged by the registry; keep watching.

            let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
            let flight = flights.entry(id).or_default();
            if flight.pending {
                flight.pending = false;
                tracing::debug!(task = %id, "Rerunning after queued change");
                continue;
            }
            flight.running = false;
            break;
        }
    }
}

/// Maps file changes under the source root to task runs and reloads.
pub struct WatchCoordinator {
    root: PathBuf,
    bindings: Bindings,
    runner: TaskRunner,
    reload: ReloadBus,
    debounce: Duration,
}

impl WatchCoordinator {
    pub fn new(registry: TaskRegistry, ctx: TaskContext) -> Result<Self, ServerError> {
        let root = ctx.layout.root.clone();
        let reload = ctx.reload.clone();
        let debounce = Duration::from_millis(ctx.config.watch.debounce_ms);
        Ok(Self {
            root,
            bindings: Bindings::standard()?,
            runner: TaskRunner::new(registry, ctx),
            reload,
            debounce,
        })
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    /// Distinct actions for a batch of changed paths.
    pub fn actions_for_paths<'a, I>(&self, paths: I) -> BTreeSet<Action>
    where
        I: IntoIterator<Item = &'a PathBuf>,
    {
        paths
            .into_iter()
            .filter_map(|path| path.strip_prefix(&self.root).ok())
            .flat_map(|relative| self.bindings.actions_for(relative))
            .collect()
    }

    /// Watch the source root until the process ends.
    pub async fn watch(mut self) -> Result<(), ServerError> {
        // notify reports canonical paths
        if let Ok(canonical) = self.root.canonicalize() {
            self.root = canonical;
        }
        let (watcher, rx) =
            FileWatcher::new(&self.root).map_err(|e| ServerError::Watch(e.to_string()))?;
        tracing::info!(root = %self.root.display(), "Watching for changes");

        self.run(rx).await;
        drop(watcher);
        Ok(())
    }

    /// Consume change events until the channel closes.
    pub async fn run(&self, mut events: mpsc::Receiver<PathBuf>) {
        while let Some(first) = events.recv().await {
            let mut batch = BTreeSet::from([first]);
            let window = tokio::time::sleep(self.debounce);
            tokio::pin!(window);

            let mut closed = false;
            loop {
                tokio::select! {
                    _ = &mut window => break,
                    next = events.recv() => match next {
                        Some(path) => {
                            batch.insert(path);
                        }
                        None => {
                            closed = true;
                            break;
                        }
                    },
                }
            }

            self.dispatch(&batch);
            if closed {
                break;
            }
        }
    }

    fn dispatch(&self, batch: &BTreeSet<PathBuf>) {
        let actions = self.actions_for_paths(batch);
        if actions.is_empty() {
            return;
        }
        tracing::debug!(changes = batch.len(), actions = ?actions, "Dispatching changes");

        for action in actions {
            match action {
                Action::Reload => self.reload.publish(ReloadMessage::Reload),
                Action::Run(id) => {
                    let trigger = self.runner.trigger(id);
                    tracing::debug!(task = %id, trigger = ?trigger, "Triggered");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{KilnConfig, Layout, Task, TaskError, TaskReport};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct Counting {
        id: TaskId,
        runs: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl Task for Counting {
        fn id(&self) -> TaskId {
            self.id
        }

        fn run(&self, _ctx: &TaskContext) -> Result<TaskReport, TaskError> {
            std::thread::sleep(self.delay);
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(TaskReport::default())
        }
    }

    fn setup(delay: Duration) -> (tempfile::TempDir, WatchCoordinator, Arc<AtomicUsize>) {
        let temp = tempdir().unwrap();
        let layout = Layout::new(temp.path().join("app"), temp.path().join("dist"));
        let mut config = KilnConfig::default();
        config.watch.debounce_ms = 50;
        let ctx = TaskContext::new(layout, config);

        let runs = Arc::new(AtomicUsize::new(0));
        let registry = TaskRegistry::from_tasks(vec![Arc::new(Counting {
            id: TaskId::Styles,
            runs: Arc::clone(&runs),
            delay,
        })])
        .unwrap();

        let coordinator = WatchCoordinator::new(registry, ctx).unwrap();
        (temp, coordinator, runs)
    }

    async fn wait_idle(runner: &TaskRunner) {
        for _ in 0..200 {
            if runner.is_idle() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("runner never became idle");
    }

    #[test]
    fn standard_bindings_route_changes() {
        let bindings = Bindings::standard().unwrap();
        let actions = |p: &str| bindings.actions_for(Path::new(p)).into_iter().collect::<Vec<_>>();

        assert_eq!(
            actions("pages/index.html"),
            vec![Action::Reload, Action::Run(TaskId::Html)]
        );
        assert_eq!(
            actions("components/nav/menu.html"),
            vec![Action::Reload, Action::Run(TaskId::Html)]
        );
        assert_eq!(actions("index.html"), vec![Action::Reload]);
        assert_eq!(actions("scss/base/_vars.scss"), vec![Action::Run(TaskId::Styles)]);
        assert_eq!(actions("images/src/hero.png"), vec![Action::Run(TaskId::Images)]);
        assert_eq!(actions("fonts/src/Inter.ttf"), vec![Action::Run(TaskId::Fonts)]);
        assert_eq!(actions("js/main.js"), vec![Action::Run(TaskId::Scripts)]);
    }

    #[test]
    fn task_outputs_do_not_retrigger() {
        let bindings = Bindings::standard().unwrap();
        for output in [
            "css/style.min.css",
            "js/main.min.js",
            "images/dist/hero.webp",
            "fonts/Inter.woff2",
            ".kiln/image-cache.json",
        ] {
            assert!(bindings.actions_for(Path::new(output)).is_empty(), "{output}");
        }
    }

    #[tokio::test]
    async fn single_flight_queues_one_rerun() {
        let (_temp, coordinator, runs) = setup(Duration::from_millis(150));
        let runner = coordinator.runner();

        assert_eq!(runner.trigger(TaskId::Styles), Trigger::Started);
        assert_eq!(runner.trigger(TaskId::Styles), Trigger::Queued);
        assert_eq!(runner.trigger(TaskId::Styles), Trigger::Coalesced);
        assert_eq!(runner.trigger(TaskId::Styles), Trigger::Coalesced);

        wait_idle(runner).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn debounces_bursts_into_one_run() {
        let (_temp, coordinator, runs) = setup(Duration::from_millis(10));
        let root = coordinator.root.clone();
        let (tx, rx) = mpsc::channel(16);

        for name in ["style.scss", "_vars.scss", "_grid.scss"] {
            tx.send(root.join("scss").join(name)).await.unwrap();
        }
        drop(tx);
        coordinator.run(rx).await;

        wait_idle(coordinator.runner()).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn html_changes_publish_reload() {
        let (_temp, coordinator, runs) = setup(Duration::from_millis(10));
        let mut reloads = coordinator.reload.subscribe();
        let (tx, rx) = mpsc::channel(4);

        tx.send(coordinator.root.join("about.html")).await.unwrap();
        drop(tx);
        coordinator.run(rx).await;

        assert_eq!(reloads.try_recv().unwrap(), ReloadMessage::Reload);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ignores_paths_outside_root() {
        let (_temp, coordinator, runs) = setup(Duration::from_millis(10));
        let (tx, rx) = mpsc::channel(4);

        tx.send(PathBuf::from("/elsewhere/scss/style.scss")).await.unwrap();
        drop(tx);
        coordinator.run(rx).await;

        wait_idle(coordinator.runner()).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
