//! Task trait and shared task types.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::config::KilnConfig;
use crate::layout::Layout;
use crate::reload::ReloadBus;

/// Identifier of a named task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TaskId {
    Html,
    Styles,
    Fonts,
    Images,
    Scripts,
    Clean,
    Assemble,
}

impl TaskId {
    /// Every task, in declaration order.
    pub const ALL: [TaskId; 7] = [
        TaskId::Html,
        TaskId::Styles,
        TaskId::Fonts,
        TaskId::Images,
        TaskId::Scripts,
        TaskId::Clean,
        TaskId::Assemble,
    ];

    /// The per-asset builders started by the default composite.
    pub const ASSETS: [TaskId; 5] = [
        TaskId::Html,
        TaskId::Fonts,
        TaskId::Images,
        TaskId::Styles,
        TaskId::Scripts,
    ];

    /// Invocation name on the command line.
    pub fn name(self) -> &'static str {
        match self {
            TaskId::Html => "buildHTML",
            TaskId::Styles => "buildStyles",
            TaskId::Fonts => "buildFonts",
            TaskId::Images => "buildImages",
            TaskId::Scripts => "buildScripts",
            TaskId::Clean => "cleanDist",
            TaskId::Assemble => "buildApp",
        }
    }

    fn kebab_name(self) -> &'static str {
        match self {
            TaskId::Html => "build-html",
            TaskId::Styles => "build-styles",
            TaskId::Fonts => "build-fonts",
            TaskId::Images => "build-images",
            TaskId::Scripts => "build-scripts",
            TaskId::Clean => "clean-dist",
            TaskId::Assemble => "build-app",
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        TaskId::ALL
            .into_iter()
            .find(|id| id.name() == s || id.kebab_name() == s)
            .ok_or_else(|| format!("unknown task: {s}"))
    }
}

/// Everything a task needs to run.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub layout: Layout,
    pub config: KilnConfig,
    pub reload: ReloadBus,
}

impl TaskContext {
    pub fn new(layout: Layout, config: KilnConfig) -> Self {
        Self {
            layout,
            config,
            reload: ReloadBus::new(),
        }
    }

    /// Use an existing bus (shared with the dev server).
    pub fn with_reload(mut self, reload: ReloadBus) -> Self {
        self.reload = reload;
        self
    }
}

/// Result of a single task run.
#[derive(Debug, Clone, Default)]
pub struct TaskReport {
    /// Files written by this run
    pub written: Vec<PathBuf>,

    /// Outputs skipped as already fresh
    pub skipped: usize,

    /// Total run time in milliseconds
    pub duration_ms: u64,
}

impl TaskReport {
    pub fn record(&mut self, path: impl Into<PathBuf>) {
        self.written.push(path.into());
    }
}

/// Errors that abort a task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("{file}:{line}:{column}: {message}")]
    Syntax {
        file: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{page}: included file not found: {include}")]
    MissingInclude { page: PathBuf, include: String },

    #[error("include cycle: {}", .chain.join(" -> "))]
    IncludeCycle { chain: Vec<String> },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {}: {message}", .path.display())]
    Encode { path: PathBuf, message: String },

    #[error("missing build artifacts (run the asset builders first): {}", .missing.join(", "))]
    MissingArtifacts { missing: Vec<String> },

    #[error("{0}")]
    Config(String),
}

impl TaskError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        TaskError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn encode(path: &Path, message: impl fmt::Display) -> Self {
        TaskError::Encode {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

/// A named build step.
///
/// Tasks are defined once at startup and never mutated; `run` may be called
/// any number of times and re-derives all output from current sources.
pub trait Task: Send + Sync {
    fn id(&self) -> TaskId;

    /// Tasks that must complete before this one.
    fn deps(&self) -> &[TaskId] {
        &[]
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError>;
}
