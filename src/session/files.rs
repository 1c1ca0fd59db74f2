//! Staged upload descriptors and their release.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A file received from the caller and staged on local disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedFile {
    /// Filename as supplied by the caller.
    pub original_name: String,
    /// Declared MIME type of the part.
    pub content_type: String,
    /// Size in bytes written to the staging area.
    pub size: u64,
    /// Location in the staging directory.
    pub path: PathBuf,
}

impl StagedFile {
    /// Delete the staged copy. A file that is already gone counts as released.
    pub async fn release(&self) -> io::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = ?self.path, "Staged file already removed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Strip path components and unusual characters from a caller-supplied filename.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.chars().take(128).collect()
    }
}
