//! Build tasks for the kiln asset pipeline.
//!
//! Each task implements [`kiln_core::Task`] and may be run on its own or
//! through a [`TaskRegistry`] plan.

pub mod assemble;
pub mod clean;
pub mod fonts;
pub mod html;
pub mod images;
pub mod registry;
pub mod scripts;
pub mod styles;

pub use assemble::{AssembleTask, ReleaseOptions, RELEASE_MANIFEST};
pub use clean::CleanTask;
pub use fonts::FontsTask;
pub use html::HtmlTask;
pub use images::ImagesTask;
pub use registry::{RunError, TaskRegistry};
pub use scripts::ScriptsTask;
pub use styles::StylesTask;
