//! Live-reload event bus.
//!
//! Tasks publish here when they have produced new output; the dev server
//! subscribes and forwards messages to connected browsers. Publishing with no
//! subscribers is a no-op, so tasks run the same with or without a server.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Messages sent to browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Full page reload
    Reload,

    /// Swap a stylesheet in place
    Css {
        /// URL path of the rebuilt stylesheet
        path: String,
    },

    /// Connection established
    Connected,
}

/// Broadcast hub for reload messages.
#[derive(Debug, Clone)]
pub struct ReloadBus {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to every subscriber.
    pub fn publish(&self, msg: ReloadMessage) {
        // No receivers is fine
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadBus {
    fn default() -> Self {
        Self::new()
    }
}
