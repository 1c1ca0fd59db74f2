//! Durable audit snapshot stores.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::session::SessionSnapshot;

/// Idempotent sink for session snapshots keyed by (user id, request id).
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn put(&self, snapshot: &SessionSnapshot) -> GatewayResult<()>;
}

/// Writes `<root>/<user>/<request>.json`.
#[derive(Debug, Clone)]
pub struct FsAuditStore {
    root: PathBuf,
}

impl FsAuditStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Location of the snapshot for a key.
    pub fn path_for(&self, user_id: &str, request_id: Uuid) -> PathBuf {
        self.root
            .join(user_dir_name(user_id))
            .join(format!("{}.json", request_id))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Directory name for a user id.
///
/// ASCII letters, digits, `-` and `_` pass through; every other byte becomes
/// `%XX`. Distinct ids never share a directory and no id can name `.` or `..`.
pub fn user_dir_name(user_id: &str) -> String {
    let mut out = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Temp file removed on drop unless published.
struct PendingWrite {
    path: PathBuf,
    published: bool,
}

impl PendingWrite {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            published: false,
        }
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        if !self.published {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[async_trait]
impl AuditStore for FsAuditStore {
    async fn put(&self, snapshot: &SessionSnapshot) -> GatewayResult<()> {
        let path = self.path_for(&snapshot.user_id, snapshot.request_id);
        let body = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| GatewayError::persistence(format!("Failed to encode snapshot: {}", e)))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GatewayError::persistence(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        // Write-then-rename so readers never see a partial snapshot.
        // Dropping `pending` mid-write (error or caller timeout) removes the temp file.
        let mut pending = PendingWrite::new(path.with_extension("json.tmp"));
        tokio::fs::write(&pending.path, &body).await.map_err(|e| {
            GatewayError::persistence(format!("Failed to write {}: {}", pending.path.display(), e))
        })?;
        tokio::fs::rename(&pending.path, &path).await.map_err(|e| {
            GatewayError::persistence(format!("Failed to publish {}: {}", path.display(), e))
        })?;
        pending.published = true;

        tracing::debug!(path = ?path, "Audit snapshot written");
        Ok(())
    }
}

/// In-memory store, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    snapshots: DashMap<(String, Uuid), SessionSnapshot>,
    writes: std::sync::atomic::AtomicUsize,
    fail: AtomicBool,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every write.
    pub fn failing() -> Self {
        let store = Self::default();
        store.fail.store(true, Ordering::SeqCst);
        store
    }

    pub fn get(&self, user_id: &str, request_id: Uuid) -> Option<SessionSnapshot> {
        self.snapshots
            .get(&(user_id.to_string(), request_id))
            .map(|s| s.value().clone())
    }

    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.snapshots.iter().map(|s| s.value().clone()).collect()
    }

    /// Number of distinct keys stored.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Number of write attempts, including rejected ones.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn put(&self, snapshot: &SessionSnapshot) -> GatewayResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::persistence("audit store unavailable"));
        }
        self.snapshots.insert(
            (snapshot.user_id.clone(), snapshot.request_id),
            snapshot.clone(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ProcessingSession;

    #[tokio::test]
    async fn test_fs_store_writes_keyed_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAuditStore::new(dir.path());
        let session = ProcessingSession::new(Uuid::new_v4(), "acme");
        let snapshot = session.snapshot();

        store.put(&snapshot).await.unwrap();
        // Idempotent rewrite of the same key.
        store.put(&snapshot).await.unwrap();

        let path = store.path_for("acme", snapshot.request_id);
        let stored: SessionSnapshot =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(stored, snapshot);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_user_id_cannot_escape_root() {
        let store = FsAuditStore::new("/audit");
        let path = store.path_for("../../etc", Uuid::nil());
        assert!(path.starts_with("/audit"));
        assert_eq!(path.parent().unwrap(), Path::new("/audit/%2E%2E%2F%2E%2E%2Fetc"));
    }

    #[test]
    fn test_user_dirs_do_not_collide() {
        let store = FsAuditStore::new("/audit");
        let id = Uuid::nil();
        assert_ne!(store.path_for("a/b", id), store.path_for("a_b", id));
        assert_ne!(store.path_for("a%2Fb", id), store.path_for("a/b", id));
        assert_eq!(user_dir_name("acme-01_x"), "acme-01_x");
        assert_eq!(user_dir_name("a/b"), "a%2Fb");
    }

    #[tokio::test]
    async fn test_failed_publish_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAuditStore::new(dir.path());
        let snapshot = ProcessingSession::new(Uuid::new_v4(), "acme").snapshot();

        // A directory at the final path makes the rename fail.
        let path = store.path_for("acme", snapshot.request_id);
        tokio::fs::create_dir_all(path.join("occupied")).await.unwrap();

        let err = store.put(&snapshot).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Persistence);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_abandoned_write_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("x.json.tmp");
        std::fs::write(&tmp, b"{").unwrap();
        drop(PendingWrite::new(tmp.clone()));
        assert!(!tmp.exists());

        std::fs::write(&tmp, b"{}").unwrap();
        let mut pending = PendingWrite::new(tmp.clone());
        pending.published = true;
        drop(pending);
        assert!(tmp.exists());
    }

    #[tokio::test]
    async fn test_memory_store_counts_writes() {
        let store = MemoryAuditStore::failing();
        let snapshot = ProcessingSession::new(Uuid::new_v4(), "u").snapshot();
        assert!(store.put(&snapshot).await.is_err());
        assert_eq!(store.writes(), 1);
        assert!(store.is_empty());
    }
}
