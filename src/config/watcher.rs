//! User directory file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::auth::users::{SharedDirectory, UserDirectory};

/// A watcher that monitors the user directory file for changes.
pub struct DirectoryWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<UserDirectory>,
}

impl DirectoryWatcher {
    /// Create a new DirectoryWatcher.
    ///
    /// Returns the watcher and a receiver for reloaded directories.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<UserDirectory>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for events to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("User directory change detected, reloading...");
                        match UserDirectory::load(&path) {
                            Ok(directory) => {
                                let _ = tx.send(directory);
                            }
                            Err(e) => {
                                tracing::error!(
                                    "Failed to reload user directory: {}. Keeping current directory.",
                                    e
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "User directory watcher started");
        Ok(watcher)
    }
}

/// Publish every reloaded directory until the watcher goes away.
pub async fn apply_updates(
    shared: SharedDirectory,
    mut updates: mpsc::UnboundedReceiver<UserDirectory>,
) {
    while let Some(directory) = updates.recv().await {
        shared.replace(directory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_apply_updates_replaces_directory() {
        let shared = SharedDirectory::new(UserDirectory::default());
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(apply_updates(shared.clone(), rx));
        tx.send(UserDirectory::parse("[[users]]\nid = \"a\"\ntoken = \"t\"\n").unwrap())
            .unwrap();
        drop(tx);
        task.await.unwrap();

        assert!(shared.snapshot().get("a").is_some());
    }
}
