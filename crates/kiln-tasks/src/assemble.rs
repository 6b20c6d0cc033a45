//! Release assembly.
//!
//! Copies the built artifacts named by [`RELEASE_MANIFEST`] from the source
//! root into the distributable directory, byte for byte, keeping relative
//! paths. Nothing is rebuilt here.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use kiln_core::{SourceSet, Task, TaskContext, TaskError, TaskId, TaskReport};

/// Patterns, relative to the source root, that make up a release.
pub const RELEASE_MANIFEST: [&str; 5] = [
    "index.html",
    "css/style.min.css",
    "images/dist/*.*",
    "fonts/*.*",
    "js/main.min.js",
];

/// Single-file artifacts a release cannot ship without.
pub const REQUIRED_ARTIFACTS: [&str; 3] = ["index.html", "css/style.min.css", "js/main.min.js"];

const CLEAN_ONLY: [TaskId; 1] = [TaskId::Clean];

const CLEAN_AND_ASSETS: [TaskId; 6] = [
    TaskId::Clean,
    TaskId::Html,
    TaskId::Fonts,
    TaskId::Images,
    TaskId::Styles,
    TaskId::Scripts,
];

/// How assembly treats missing build output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseOptions {
    /// Warn about missing required artifacts instead of failing.
    pub allow_incomplete: bool,

    /// Depend on every asset builder, not just `cleanDist`.
    pub full: bool,
}

#[derive(Debug, Default)]
pub struct AssembleTask {
    options: ReleaseOptions,
}

impl AssembleTask {
    pub fn new(options: ReleaseOptions) -> Self {
        Self { options }
    }

    fn missing_artifacts(&self, ctx: &TaskContext) -> Vec<String> {
        REQUIRED_ARTIFACTS
            .iter()
            .filter(|rel| !ctx.layout.root.join(rel).is_file())
            .map(|rel| rel.to_string())
            .collect()
    }
}

impl Task for AssembleTask {
    fn id(&self) -> TaskId {
        TaskId::Assemble
    }

    fn deps(&self) -> &[TaskId] {
        if self.options.full {
            &CLEAN_AND_ASSETS
        } else {
            &CLEAN_ONLY
        }
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        let layout = &ctx.layout;

        let missing = self.missing_artifacts(ctx);
        if !missing.is_empty() {
            if !self.options.allow_incomplete {
                return Err(TaskError::MissingArtifacts { missing });
            }
            for artifact in &missing {
                tracing::warn!(artifact = %artifact, "Release is missing an artifact");
            }
        }

        let files = SourceSet::new(&layout.root, RELEASE_MANIFEST).files()?;

        let mut report = TaskReport::default();
        for file in files {
            let relative = file.strip_prefix(&layout.root).unwrap_or(&file);
            let dest: PathBuf = layout.dist.join(relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
            }
            fs::copy(&file, &dest).map_err(|e| TaskError::io(&file, e))?;
            report.record(dest);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            files = report.written.len(),
            dist = %layout.dist.display(),
            "Assembled release"
        );
        Ok(report)
    }
}
