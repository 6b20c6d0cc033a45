//! HTML assembly: inline fragment files into pages.
//!
//! Pages under `pages/` may reference fragments with
//! `<!--=include header.html -->`, `<!--=require nav.html -->` (inlined once
//! per page) or `@@include('footer.html')`. Fragments may include further
//! fragments. References resolve against the including file's directory
//! first, then the components directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;

use kiln_core::fsutil::write_atomic;
use kiln_core::{ReloadMessage, SourceSet, Task, TaskContext, TaskError, TaskId, TaskReport};

static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<!--\s*=\s*(?P<kind>include|require)\s+(?P<path>[^\s>]+)\s*-->|@@include\(\s*['"](?P<at>[^'"]+)['"]\s*\)"#,
    )
    .expect("Invalid include directive regex")
});

/// Builds every top-level page.
#[derive(Debug, Default)]
pub struct HtmlTask;

impl Task for HtmlTask {
    fn id(&self) -> TaskId {
        TaskId::Html
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        let layout = &ctx.layout;
        let pages = SourceSet::new(&layout.root, ["pages/*.html"]).files()?;
        let components = layout.components_dir();

        // Resolve every page before writing any, so a bad include leaves
        // all previous output in place.
        let mut rendered = Vec::with_capacity(pages.len());
        for page in &pages {
            let html = assemble_page(page, &components)?;
            let name = page.file_name().unwrap_or_default();
            rendered.push((layout.html_out_dir().join(name), html));
        }

        let mut report = TaskReport::default();
        for (out, html) in rendered {
            write_atomic(&out, html)?;
            report.record(out);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(pages = report.written.len(), "Assembled HTML pages");

        ctx.reload.publish(ReloadMessage::Reload);
        Ok(report)
    }
}

/// Expand all include directives in `page`.
pub fn assemble_page(page: &Path, components_dir: &Path) -> Result<String, TaskError> {
    let source = fs::read_to_string(page).map_err(|e| TaskError::io(page, e))?;
    let dir = page.parent().unwrap_or(Path::new("."));

    let mut includer = Includer {
        page,
        components_dir,
        required: HashSet::new(),
        stack: vec![canonical(page)],
    };
    includer.expand(&source, dir)
}

struct Includer<'a> {
    page: &'a Path,
    components_dir: &'a Path,
    /// Fragments already pulled in by `require`
    required: HashSet<PathBuf>,
    /// Files currently being expanded, outermost first
    stack: Vec<PathBuf>,
}

impl Includer<'_> {
    fn expand(&mut self, source: &str, dir: &Path) -> Result<String, TaskError> {
        let mut out = String::with_capacity(source.len());
        let mut last = 0;

        for caps in DIRECTIVE_RE.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&source[last..whole.start()]);
            last = whole.end();

            let (target, once) = match (caps.name("path"), caps.name("at")) {
                (Some(path), _) => {
                    let once = caps.name("kind").is_some_and(|k| k.as_str() == "require");
                    (path.as_str(), once)
                }
                (None, Some(at)) => (at.as_str(), false),
                (None, None) => continue,
            };

            let resolved = self
                .resolve(target, dir)
                .ok_or_else(|| TaskError::MissingInclude {
                    page: self.page.to_path_buf(),
                    include: target.to_string(),
                })?;
            let key = canonical(&resolved);

            if once && !self.required.insert(key.clone()) {
                continue;
            }
            if self.stack.contains(&key) {
                let mut chain: Vec<String> = self.stack.iter().map(|p| display_name(p)).collect();
                chain.push(display_name(&key));
                return Err(TaskError::IncludeCycle { chain });
            }

            let body = fs::read_to_string(&resolved).map_err(|e| TaskError::io(&resolved, e))?;
            let nested_dir = resolved.parent().unwrap_or(dir).to_path_buf();

            self.stack.push(key);
            let expanded = self.expand(&body, &nested_dir)?;
            self.stack.pop();

            out.push_str(expanded.trim_end_matches(['\n', '\r']));
        }

        out.push_str(&source[last..]);
        Ok(out)
    }

    fn resolve(&self, target: &str, dir: &Path) -> Option<PathBuf> {
        [dir.join(target), self.components_dir.join(target)]
            .into_iter()
            .find(|candidate| candidate.is_file())
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
