//! Style build: Sass compilation, vendor prefixing, concatenation.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Instant;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use regex::Regex;

use kiln_core::config::StylesConfig;
use kiln_core::fsutil::write_atomic;
use kiln_core::{ReloadMessage, SourceSet, Task, TaskContext, TaskError, TaskId, TaskReport};

/// Entry stylesheets, relative to the source root. Partials are pulled in by `@import`/`@use`.
const STYLE_ENTRIES: [&str; 1] = ["scss/style.scss"];

/// Compiles the entry stylesheet into `css/style.min.css`.
#[derive(Debug, Default)]
pub struct StylesTask;

impl Task for StylesTask {
    fn id(&self) -> TaskId {
        TaskId::Styles
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        let layout = &ctx.layout;

        let entries = SourceSet::new(&layout.root, STYLE_ENTRIES).files()?;
        if entries.is_empty() {
            let entry = layout.style_entry();
            return Err(TaskError::io(
                &entry,
                std::io::Error::new(std::io::ErrorKind::NotFound, "style entry not found"),
            ));
        }

        let mut bundle = Vec::with_capacity(entries.len());
        for entry in &entries {
            let css = compile_scss(entry, &layout.scss_dir())?;
            bundle.push(finish_css(entry, &css, &ctx.config.styles)?);
        }

        let out = layout.css_output();
        write_atomic(&out, bundle.join("\n"))?;

        let mut report = TaskReport::default();
        report.record(&out);
        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(output = %out.display(), "Compiled stylesheet");

        ctx.reload.publish(ReloadMessage::Css {
            path: layout.url_path(&out),
        });
        Ok(report)
    }
}

/// Compile one Sass entry to plain CSS.
pub fn compile_scss(entry: &Path, load_path: &Path) -> Result<String, TaskError> {
    let options = grass::Options::default()
        .load_path(load_path)
        .style(grass::OutputStyle::Expanded);

    grass::from_path(entry, &options).map_err(|err| sass_error(entry, &err))
}

fn sass_error(entry: &Path, err: &grass::Error) -> TaskError {
    match err.clone().kind() {
        grass::ErrorKind::ParseError { message, loc, .. } => TaskError::Syntax {
            file: PathBuf::from(loc.file.name()),
            line: loc.begin.line + 1,
            column: loc.begin.column + 1,
            message,
        },
        grass::ErrorKind::IoError(io) => {
            TaskError::io(entry, std::io::Error::new(io.kind(), io.to_string()))
        }
        _ => TaskError::encode(entry, err),
    }
}

/// Prefix (and optionally minify) compiled CSS for the configured browsers.
pub fn finish_css(file: &Path, css: &str, config: &StylesConfig) -> Result<String, TaskError> {
    let targets = browser_targets(&config.browsers)?;

    let mut sheet = StyleSheet::parse(
        css,
        ParserOptions {
            filename: file.display().to_string(),
            ..Default::default()
        },
    )
    .map_err(|e| css_error(file, e))?;

    sheet
        .minify(MinifyOptions {
            targets,
            ..Default::default()
        })
        .map_err(|e| css_error(file, e))?;

    let printed = sheet
        .to_css(PrinterOptions {
            minify: config.minify,
            targets,
            ..Default::default()
        })
        .map_err(|e| css_error(file, e))?;

    if config.grid {
        Ok(prefix_grid(&printed.code))
    } else {
        Ok(printed.code)
    }
}

fn browser_targets(query: &[String]) -> Result<Targets, TaskError> {
    let browsers = Browsers::from_browserslist(query.iter().map(String::as_str))
        .map_err(|e| TaskError::Config(format!("invalid browserslist query: {e}")))?;

    Ok(Targets {
        browsers,
        ..Default::default()
    })
}

fn css_error<T: std::fmt::Display>(file: &Path, err: lightningcss::error::Error<T>) -> TaskError {
    let (line, column) = err
        .loc
        .as_ref()
        .map(|loc| (loc.line as usize + 1, loc.column as usize))
        .unwrap_or((0, 0));

    TaskError::Syntax {
        file: file.to_path_buf(),
        line,
        column,
        message: err.kind.to_string(),
    }
}

static DISPLAY_GRID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<pre>[{;]\s*)display\s*:\s*(?P<value>grid|inline-grid)\s*(?P<post>[;}])")
        .expect("Invalid display grid regex")
});

static GRID_TRACKS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<pre>[{;]\s*)grid-template-(?P<axis>columns|rows)\s*:\s*(?P<value>[^;}]+?)\s*(?P<post>[;}])")
        .expect("Invalid grid tracks regex")
});

/// Add legacy `-ms-` grid declarations ahead of their standard forms.
///
/// Only explicit track lists are translated; `repeat()` and named lines have
/// no `-ms-` equivalent and are left alone.
pub fn prefix_grid(css: &str) -> String {
    let css = DISPLAY_GRID_RE.replace_all(css, |caps: &regex::Captures| {
        format!(
            "{pre}display:-ms-{value};display:{value}{post}",
            pre = &caps["pre"],
            value = &caps["value"],
            post = &caps["post"],
        )
    });

    GRID_TRACKS_RE
        .replace_all(&css, |caps: &regex::Captures| {
            let value = &caps["value"];
            if value.contains("repeat(") || value.contains('[') || value.contains('"') {
                return caps[0].to_string();
            }
            format!(
                "{pre}-ms-grid-{axis}:{value};grid-template-{axis}:{value}{post}",
                pre = &caps["pre"],
                axis = &caps["axis"],
                post = &caps["post"],
            )
        })
        .into_owned()
}
