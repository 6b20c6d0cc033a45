//! Script build: minify the single JS entry into `js/main.min.js`.

use std::fs;
use std::path::Path;
use std::time::Instant;

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;

use kiln_core::fsutil::write_atomic;
use kiln_core::{ReloadMessage, Task, TaskContext, TaskError, TaskId, TaskReport};

/// Minifies `js/main.js`. The entry is expected to be self-contained.
#[derive(Debug, Default)]
pub struct ScriptsTask;

impl Task for ScriptsTask {
    fn id(&self) -> TaskId {
        TaskId::Scripts
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        let entry = ctx.layout.script_entry();
        let source = fs::read_to_string(&entry).map_err(|e| TaskError::io(&entry, e))?;

        let code = minify_script(&entry, &source, ctx.config.scripts.mangle)?;

        let out = ctx.layout.js_output();
        write_atomic(&out, code)?;

        let mut report = TaskReport::default();
        report.record(&out);
        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(output = %out.display(), "Minified script");

        ctx.reload.publish(ReloadMessage::Reload);
        Ok(report)
    }
}

/// Parse, compress and print `source` minified.
pub fn minify_script(path: &Path, source: &str, mangle: bool) -> Result<String, TaskError> {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path).unwrap_or_default();

    let parsed = Parser::new(&allocator, source, source_type).parse();
    if let Some(error) = parsed.errors.first() {
        let offset = error
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map(|label| label.offset())
            .unwrap_or(0);
        let (line, column) = line_column(source, offset);

        return Err(TaskError::Syntax {
            file: path.to_path_buf(),
            line,
            column,
            message: error.to_string(),
        });
    }

    let mut program = parsed.program;
    let options = MinifierOptions {
        mangle: mangle.then(MangleOptions::default),
        compress: Some(CompressOptions::default()),
    };
    let minified = Minifier::new(options).build(&allocator, &mut program);

    let code = Codegen::new()
        .with_options(CodegenOptions::minify())
        .with_scoping(minified.scoping)
        .build(&program)
        .code;

    Ok(code)
}

/// 1-based line and column of a byte offset.
fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source.as_bytes()[..offset];
    let line = before.iter().filter(|b| **b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    (line, offset - line_start + 1)
}
