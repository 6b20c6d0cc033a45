//! Font build.
//!
//! Phase one normalises every staged font to `.ttf` and `.woff`; phase two
//! encodes every `.ttf` in the fonts directory, phase one's output included,
//! to `.woff2`. Phase two starts only after phase one has written everything.

pub mod sfnt;
pub mod woff;
pub mod woff2;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;

use kiln_core::fsutil::{file_stem, write_atomic};
use kiln_core::{SourceSet, Task, TaskContext, TaskError, TaskId, TaskReport};

use self::sfnt::Sfnt;

/// Errors from the font containers.
#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("unexpected end of font data")]
    Truncated,

    #[error("unrecognised font signature")]
    BadSignature,

    #[error("unsupported font: {0}")]
    Unsupported(String),

    #[error("invalid font: {0}")]
    Invalid(String),

    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// Converts staged fonts to ttf, woff and woff2.
#[derive(Debug, Default)]
pub struct FontsTask;

impl Task for FontsTask {
    fn id(&self) -> TaskId {
        TaskId::Fonts
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        let layout = &ctx.layout;
        let fonts_dir = layout.fonts_dir();
        let mut report = TaskReport::default();

        let sources = SourceSet::new(&layout.root, ["fonts/src/*.*"]).files()?;
        let converted: Vec<Vec<PathBuf>> = sources
            .par_iter()
            .map(|source| convert_source(source, &fonts_dir))
            .collect::<Result<_, _>>()?;
        for path in converted.into_iter().flatten() {
            report.record(path);
        }

        let ttfs = SourceSet::new(&layout.root, ["fonts/*.ttf"]).files()?;
        let compressed: Vec<PathBuf> = ttfs
            .par_iter()
            .map(|ttf| compress_ttf(ttf, &fonts_dir))
            .collect::<Result<_, _>>()?;
        for path in compressed {
            report.record(path);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            sources = sources.len(),
            woff2 = ttfs.len(),
            "Built fonts"
        );
        Ok(report)
    }
}

/// Phase one: write `<stem>.ttf` and `<stem>.woff` for one staged font.
fn convert_source(source: &Path, fonts_dir: &Path) -> Result<Vec<PathBuf>, TaskError> {
    let data = fs::read(source).map_err(|e| TaskError::io(source, e))?;
    let font = load_font(&data).map_err(|e| TaskError::encode(source, e))?;
    let sfnt_bytes = font.to_bytes();
    validate(source, &sfnt_bytes)?;

    let stem = file_stem(source);
    let ttf = fonts_dir.join(format!("{stem}.ttf"));
    let woff_path = fonts_dir.join(format!("{stem}.woff"));

    let woff_bytes = woff::encode(&font).map_err(|e| TaskError::encode(source, e))?;
    write_atomic(&ttf, &sfnt_bytes)?;
    write_atomic(&woff_path, woff_bytes)?;

    tracing::debug!(font = %source.display(), "Converted font");
    Ok(vec![ttf, woff_path])
}

/// Phase two: write `<stem>.woff2` next to a ttf.
fn compress_ttf(ttf: &Path, fonts_dir: &Path) -> Result<PathBuf, TaskError> {
    let data = fs::read(ttf).map_err(|e| TaskError::io(ttf, e))?;
    let font = Sfnt::parse(&data).map_err(|e| TaskError::encode(ttf, e))?;
    let bytes = woff2::encode(&font).map_err(|e| TaskError::encode(ttf, e))?;

    let out = fonts_dir.join(format!("{}.woff2", file_stem(ttf)));
    write_atomic(&out, bytes)?;
    Ok(out)
}

/// Read any supported container into an sfnt.
pub fn load_font(data: &[u8]) -> Result<Sfnt, FontError> {
    match sfnt::read_u32(data, 0)? {
        woff::SIGNATURE => woff::decode(data),
        woff2::SIGNATURE => woff2::decode(data),
        0x0001_0000 | 0x4F54_544F | 0x7472_7565 => Sfnt::parse(data),
        _ => Err(FontError::BadSignature),
    }
}

fn validate(source: &Path, sfnt_bytes: &[u8]) -> Result<u16, TaskError> {
    ttf_parser::Face::parse(sfnt_bytes, 0)
        .map(|face| face.number_of_glyphs())
        .map_err(|e| TaskError::encode(source, e))
}
