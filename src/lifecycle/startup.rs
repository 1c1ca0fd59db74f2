//! Startup orchestration.
//!
//! Config first, then the user directory and its watcher, then collaborators,
//! and the listener last. Any error here is fatal.

use notify::RecommendedWatcher;

use crate::auth::{SharedDirectory, UserDirectory};
use crate::config::watcher::{apply_updates, DirectoryWatcher};
use crate::config::{ConfigError, UserStoreConfig};

/// Load the user directory named by the configuration.
pub fn load_directory(config: &UserStoreConfig) -> Result<SharedDirectory, ConfigError> {
    let directory = UserDirectory::load(&config.path)?;
    tracing::info!(path = ?config.path, users = directory.len(), "User directory loaded");
    Ok(SharedDirectory::new(directory))
}

/// Start hot reload when enabled. The returned watcher must outlive the server.
pub fn start_directory_watcher(
    config: &UserStoreConfig,
    shared: SharedDirectory,
) -> Option<RecommendedWatcher> {
    if !config.watch {
        return None;
    }

    let (watcher, updates) = DirectoryWatcher::new(&config.path);
    match watcher.run() {
        Ok(handle) => {
            tokio::spawn(apply_updates(shared, updates));
            Some(handle)
        }
        Err(e) => {
            tracing::warn!(error = %e, "User directory watcher unavailable; reload disabled");
            None
        }
    }
}
