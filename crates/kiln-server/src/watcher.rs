//! File watching for rebuilds and reloads.

use std::path::{Path, PathBuf};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Recursive watcher on one directory.
///
/// Changed paths arrive on the returned channel; the watch stops when the
/// `FileWatcher` is dropped.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    pub fn new(root: &Path) -> Result<(Self, mpsc::Receiver<PathBuf>), notify::Error> {
        let (tx, rx) = mpsc::channel(256);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) if is_change(&event.kind) => {
                    for path in event.paths {
                        // Receiver gone means we are shutting down.
                        let _ = tx.blocking_send(path);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Watch error"),
            }
        })?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        tracing::debug!(root = %root.display(), "Watching for changes");

        Ok((Self { _watcher: watcher }, rx))
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reports_changed_paths() {
        let temp = tempdir().unwrap();
        let root = temp.path().canonicalize().unwrap();

        let (watcher, mut rx) = FileWatcher::new(&root).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(root.join("style.scss"), "a{}").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;
        drop(watcher);

        let path = event.expect("timeout waiting for file watch event").unwrap();
        assert!(path.ends_with("style.scss"));
    }
}
