//! Development server with live reload for kiln.
//!
//! Serves the source root, pushes [`kiln_core::ReloadMessage`]s to browsers
//! over a websocket, and reruns build tasks when their sources change.

pub mod coordinator;
pub mod server;
pub mod watcher;
pub mod websocket;

pub use coordinator::{Action, Bindings, TaskRunner, Trigger, WatchCoordinator};
pub use server::{DevServer, DevServerConfig, ServerError};
pub use watcher::FileWatcher;
pub use websocket::{inject_script, livereload_client_script, LIVERELOAD_PATH, LIVERELOAD_SCRIPT_PATH};
