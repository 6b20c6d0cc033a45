//! Image build.
//!
//! Every raster source gets an AVIF and a WebP rendition. Every source,
//! vector included, also gets an optimised copy under its original name:
//! progressive JPEG, lossless PNG, interlaced GIF, minified SVG. Anything
//! else is copied unchanged. Outputs that are still fresh are skipped.

pub mod cache;
pub mod encode;
pub mod gif;
pub mod svg;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::ImageFormat;
use rayon::prelude::*;

use kiln_core::config::ImagesConfig;
use kiln_core::fsutil::{extension, file_stem, hash_file, write_atomic};
use kiln_core::{CacheMode, ReloadMessage, SourceSet, Task, TaskContext, TaskError, TaskId, TaskReport};

use self::cache::{FreshnessCache, MANIFEST_FILE};

/// Errors from the individual encoders.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("webp: {0}")]
    Webp(String),

    #[error("jpeg: {0}")]
    Jpeg(String),

    #[error("png: {0}")]
    Png(String),

    #[error("gif: {0}")]
    Gif(String),
}

/// Which output a job produces from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Avif,
    Webp,
    Optimized,
}

impl Variant {
    fn output_name(self, source: &Path) -> String {
        match self {
            Variant::Avif => format!("{}.avif", file_stem(source)),
            Variant::Webp => format!("{}.webp", file_stem(source)),
            Variant::Optimized => source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug)]
struct Job<'a> {
    source: &'a Path,
    variant: Variant,
    /// Output path relative to the images output directory
    key: String,
    dest: PathBuf,
}

/// Converts and optimises everything under `images/src`.
#[derive(Debug, Default)]
pub struct ImagesTask;

impl Task for ImagesTask {
    fn id(&self) -> TaskId {
        TaskId::Images
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        let layout = &ctx.layout;
        let settings = &ctx.config.images;
        let dest_dir = layout.images_dist_dir();

        let all = SourceSet::new(&layout.root, ["images/src/*.*"]).files()?;
        let raster =
            SourceSet::new(&layout.root, ["images/src/*.*", "!images/src/*.svg"]).files()?;
        let jobs = plan_jobs(&raster, &all, &dest_dir);

        let mut cache = FreshnessCache::load(
            layout.state_dir().join(MANIFEST_FILE),
            settings.cache,
        );
        let hashes: HashMap<&Path, String> = match cache.mode() {
            CacheMode::Hash => all
                .par_iter()
                .map(|path| hash_file(path).map(|hash| (path.as_path(), hash)))
                .collect::<Result<_, _>>()?,
            CacheMode::Mtime => HashMap::new(),
        };

        let outcomes: Vec<Result<bool, TaskError>> = jobs
            .par_iter()
            .map(|job| {
                let hash = hashes.get(job.source).map(String::as_str);
                if cache.is_fresh(job.source, &job.dest, &job.key, hash) {
                    return Ok(false);
                }
                let bytes =
                    encode_job(job, settings).map_err(|e| TaskError::encode(job.source, e))?;
                write_atomic(&job.dest, bytes)?;
                tracing::debug!(output = %job.dest.display(), "Encoded image");
                Ok(true)
            })
            .collect();

        // Outputs written before a failure still go into the manifest.
        let mut report = TaskReport::default();
        let mut failure = None;
        for (job, outcome) in jobs.iter().zip(outcomes) {
            match outcome {
                Ok(false) => report.skipped += 1,
                Ok(true) => {
                    report.record(job.dest.clone());
                    if let Some(hash) = hashes.get(job.source) {
                        cache.record(job.key.clone(), hash.clone());
                    }
                }
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        cache.retain_existing(&dest_dir);
        cache.save()?;
        if let Some(e) = failure {
            return Err(e);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            encoded = report.written.len(),
            skipped = report.skipped,
            "Built images"
        );

        ctx.reload.publish(ReloadMessage::Reload);
        Ok(report)
    }
}

/// Each output name gets exactly one owning source. A source's optimised
/// copy claims its own name before any conversion does; among conversions
/// the first source in sorted order wins and the rest are skipped.
fn plan_jobs<'a>(raster: &'a [PathBuf], all: &'a [PathBuf], dest_dir: &Path) -> Vec<Job<'a>> {
    let mut jobs = Vec::new();
    let mut owners: HashMap<String, &'a Path> = HashMap::new();
    let mut push = |source: &'a Path, variant: Variant| {
        let key = variant.output_name(source);
        if let Some(owner) = owners.get(&key) {
            tracing::warn!(
                output = %key,
                source = %source.display(),
                owner = %owner.display(),
                "Output name already taken, skipping"
            );
            return;
        }
        owners.insert(key.clone(), source);
        jobs.push(Job {
            source,
            variant,
            dest: dest_dir.join(&key),
            key,
        });
    };

    for source in all {
        push(source.as_path(), Variant::Optimized);
    }
    for source in raster.iter().filter(|p| is_decodable(p)) {
        let ext = extension(source);
        if ext != "avif" {
            push(source.as_path(), Variant::Avif);
        }
        if ext != "webp" {
            push(source.as_path(), Variant::Webp);
        }
    }
    jobs
}

fn is_decodable(path: &Path) -> bool {
    ImageFormat::from_path(path)
        .map(|format| format.reading_enabled())
        .unwrap_or(false)
}

fn encode_job(job: &Job<'_>, settings: &ImagesConfig) -> Result<Vec<u8>, EncodeError> {
    match job.variant {
        Variant::Avif => encode::avif(&image::open(job.source)?, settings.avif_quality),
        Variant::Webp => encode::webp(&image::open(job.source)?, settings.webp_quality),
        Variant::Optimized => optimize(job.source, settings),
    }
}

/// Optimised bytes under the source's own format.
///
/// JPEG and PNG results are only used when smaller than the source.
fn optimize(source: &Path, settings: &ImagesConfig) -> Result<Vec<u8>, EncodeError> {
    let data = fs::read(source)?;
    let optimized = match extension(source).as_str() {
        "gif" => return gif::interlace(&data),
        "svg" => return Ok(svg::optimize(&String::from_utf8_lossy(&data)).into_bytes()),
        "jpg" | "jpeg" => encode::jpeg(&image::load_from_memory(&data)?, settings.jpeg_quality)?,
        "png" => encode::png(&data, settings.png_level)?,
        _ => return Ok(data),
    };

    if optimized.len() < data.len() {
        Ok(optimized)
    } else {
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use kiln_core::{KilnConfig, Layout};
    use pretty_assertions::assert_eq;
    use std::time::SystemTime;
    use tempfile::tempdir;

    fn site(cache: CacheMode) -> (tempfile::TempDir, TaskContext) {
        let temp = tempdir().unwrap();
        let layout = Layout::new(temp.path().join("app"), temp.path().join("dist"));
        let src = layout.images_src_dir();
        fs::create_dir_all(&src).unwrap();

        sample(0).save(src.join("hero.png")).unwrap();
        sample(40).save(src.join("photo.jpg")).unwrap();
        fs::write(
            src.join("logo.svg"),
            r#"<svg width="8" height="8" viewBox="0 0 8 8"> <rect id="dot" width="8" height="8"/> </svg>"#,
        )
        .unwrap();

        let mut config = KilnConfig::default();
        config.images.cache = cache;
        (temp, TaskContext::new(layout, config))
    }

    fn sample(offset: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(16, 16, |x, y| {
            image::Rgb([(x * 16) as u8, (y * 16) as u8, offset])
        }))
    }

    fn outputs(ctx: &TaskContext) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(ctx.layout.images_dist_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn snapshot(ctx: &TaskContext) -> Vec<(String, Vec<u8>, SystemTime)> {
        let dir = ctx.layout.images_dist_dir();
        outputs(ctx)
            .into_iter()
            .map(|name| {
                let path = dir.join(&name);
                let modified = fs::metadata(&path).unwrap().modified().unwrap();
                (name, fs::read(&path).unwrap(), modified)
            })
            .collect()
    }

    #[test]
    fn builds_every_rendition_except_vector_conversions() {
        let (_temp, ctx) = site(CacheMode::Hash);

        let report = ImagesTask.run(&ctx).unwrap();

        assert_eq!(
            outputs(&ctx),
            vec![
                "hero.avif",
                "hero.png",
                "hero.webp",
                "logo.svg",
                "photo.avif",
                "photo.jpg",
                "photo.webp",
            ]
        );
        assert_eq!(report.written.len(), 7);
        assert_eq!(report.skipped, 0);

        let logo = fs::read_to_string(ctx.layout.images_dist_dir().join("logo.svg")).unwrap();
        assert!(logo.contains(r#"id="dot""#));
        assert!(!logo.contains("viewBox"));
    }

    #[test]
    fn rerun_skips_everything_and_leaves_outputs_untouched() {
        let (_temp, ctx) = site(CacheMode::Hash);
        ImagesTask.run(&ctx).unwrap();
        let before = snapshot(&ctx);

        let report = ImagesTask.run(&ctx).unwrap();

        assert!(report.written.is_empty());
        assert_eq!(report.skipped, 7);
        assert_eq!(snapshot(&ctx), before);
    }

    #[test]
    fn changed_source_rebuilds_only_its_outputs() {
        let (_temp, ctx) = site(CacheMode::Hash);
        ImagesTask.run(&ctx).unwrap();

        sample(200)
            .save(ctx.layout.images_src_dir().join("hero.png"))
            .unwrap();
        let report = ImagesTask.run(&ctx).unwrap();

        let mut rebuilt: Vec<String> = report
            .written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        rebuilt.sort();
        assert_eq!(rebuilt, vec!["hero.avif", "hero.png", "hero.webp"]);
        assert_eq!(report.skipped, 4);
    }

    #[test]
    fn deleted_output_is_rebuilt() {
        let (_temp, ctx) = site(CacheMode::Hash);
        ImagesTask.run(&ctx).unwrap();
        fs::remove_file(ctx.layout.images_dist_dir().join("photo.webp")).unwrap();

        let report = ImagesTask.run(&ctx).unwrap();

        assert_eq!(report.written.len(), 1);
        assert!(ctx.layout.images_dist_dir().join("photo.webp").exists());
    }

    #[test]
    fn mtime_mode_skips_fresh_outputs() {
        let (_temp, ctx) = site(CacheMode::Mtime);
        ImagesTask.run(&ctx).unwrap();

        let report = ImagesTask.run(&ctx).unwrap();

        assert!(report.written.is_empty());
        assert!(!ctx.layout.state_dir().join(MANIFEST_FILE).exists());
    }

    #[test]
    fn copies_unknown_files() {
        let (_temp, ctx) = site(CacheMode::Hash);
        fs::write(ctx.layout.images_src_dir().join("credits.txt"), "photo by me").unwrap();

        ImagesTask.run(&ctx).unwrap();

        let copied = fs::read_to_string(ctx.layout.images_dist_dir().join("credits.txt")).unwrap();
        assert_eq!(copied, "photo by me");
        assert!(!ctx.layout.images_dist_dir().join("credits.avif").exists());
    }

    #[test]
    fn corrupt_raster_names_the_file() {
        let (_temp, ctx) = site(CacheMode::Hash);
        fs::write(ctx.layout.images_src_dir().join("broken.png"), b"not a png").unwrap();

        let err = ImagesTask.run(&ctx).unwrap_err();
        assert!(err.to_string().contains("broken.png"));
    }

    #[test]
    fn failed_run_still_records_finished_outputs() {
        let (_temp, ctx) = site(CacheMode::Hash);
        fs::write(ctx.layout.images_src_dir().join("broken.png"), b"not a png").unwrap();
        ImagesTask.run(&ctx).unwrap_err();
        fs::remove_file(ctx.layout.images_src_dir().join("broken.png")).unwrap();

        let report = ImagesTask.run(&ctx).unwrap();

        assert!(report.written.is_empty());
        assert_eq!(report.skipped, 7);
    }

    #[test]
    fn shared_stem_has_a_single_owner() {
        let (_temp, ctx) = site(CacheMode::Hash);
        let src = ctx.layout.images_src_dir();
        sample(90).save(src.join("hero.jpg")).unwrap();
        sample(120).save(src.join("photo.webp")).unwrap();

        ImagesTask.run(&ctx).unwrap();
        let before = snapshot(&ctx);
        assert_eq!(
            outputs(&ctx),
            vec![
                "hero.avif",
                "hero.jpg",
                "hero.png",
                "hero.webp",
                "logo.svg",
                "photo.avif",
                "photo.jpg",
                "photo.webp",
            ]
        );

        for _ in 0..2 {
            let report = ImagesTask.run(&ctx).unwrap();
            assert!(report.written.is_empty());
        }
        assert_eq!(snapshot(&ctx), before);

        // photo.webp is the source's own optimised copy, not photo.jpg's conversion
        let copied = fs::read(ctx.layout.images_dist_dir().join("photo.webp")).unwrap();
        assert_eq!(copied, fs::read(src.join("photo.webp")).unwrap());
    }
}
