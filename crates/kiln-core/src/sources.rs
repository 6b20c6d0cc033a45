//! Source file selection by glob patterns.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::task::TaskError;

/// A set of include patterns with optional negations, relative to a base directory.
///
/// Patterns prefixed with `!` exclude matching files, e.g.
/// `["images/src/*.*", "!images/src/*.svg"]`.
#[derive(Debug, Clone)]
pub struct SourceSet {
    base: PathBuf,
    include: Vec<String>,
    exclude: Vec<String>,
}

impl SourceSet {
    pub fn new<I, S>(base: impl Into<PathBuf>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut include = Vec::new();
        let mut exclude = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            match pattern.strip_prefix('!') {
                Some(negated) => exclude.push(negated.to_string()),
                None => include.push(pattern.to_string()),
            }
        }

        Self {
            base: base.into(),
            include,
            exclude,
        }
    }

    /// All regular files matching the set, sorted and de-duplicated.
    pub fn files(&self) -> Result<Vec<PathBuf>, TaskError> {
        let excluded = build_globset(&self.exclude)?;
        let mut files = Vec::new();

        for pattern in &self.include {
            let full = self.base.join(pattern);
            let full = full.to_string_lossy();
            let entries = glob::glob(&full)
                .map_err(|e| TaskError::Config(format!("invalid glob pattern {pattern}: {e}")))?;

            for entry in entries {
                let path = entry.map_err(|e| {
                    let path = e.path().to_path_buf();
                    TaskError::io(&path, e.into_error())
                })?;
                if !path.is_file() {
                    continue;
                }
                if excluded.is_match(relative(&self.base, &path)) {
                    continue;
                }
                files.push(path);
            }
        }

        files.sort();
        files.dedup();
        Ok(files)
    }
}

fn relative<'a>(base: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(base).unwrap_or(path)
}

/// Build a GlobSet from string patterns.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet, TaskError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| TaskError::Config(format!("invalid glob pattern {pattern}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| TaskError::Config(e.to_string()))
}
