//! Core model for the kiln asset pipeline.
//!
//! Defines the asset directory layout, project configuration, the [`Task`]
//! trait every build step implements, the explicit dependency graph used to
//! order tasks, and the live-reload event bus tasks publish to.

pub mod config;
pub mod fsutil;
pub mod graph;
pub mod layout;
pub mod reload;
pub mod sources;
pub mod task;

pub use config::{CacheMode, ConfigError, KilnConfig};
pub use graph::{GraphError, TaskGraph};
pub use layout::Layout;
pub use reload::{ReloadBus, ReloadMessage};
pub use sources::SourceSet;
pub use task::{Task, TaskContext, TaskError, TaskId, TaskReport};
