//! Persistence for sync state and archived article files.
//!
//! ## Directory Structure
//!
//! ```text
//! ~/.curator/
//! ├── optimizely-state.json       # SyncState for one source
//! ├── optimizely-state.json.lock  # Run lock, held for a whole sync
//! └── ...
//!
//! {archive root}/
//! └── 2026/
//!     └── 01-January/
//!         └── 31/
//!             └── article.pdf
//! ```

pub mod local;
pub mod lock;
pub mod state;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::io::AsyncWriteExt;

use crate::error::Result;

// Re-export for convenience
pub use local::LocalArchive;
pub use lock::RunLock;
pub use state::{StagedSave, StateStore};

/// Identifier of a folder in the file storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderId(pub String);

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trait for file storage backends that archive article attachments.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Resolve (creating as needed) the folder for the given path segments.
    async fn ensure_folder(&self, segments: &[String]) -> Result<FolderId>;

    /// Upload a local file into a folder and return a shareable link.
    async fn upload(&self, local_path: &Path, folder: &FolderId) -> Result<String>;
}

/// Folder path segments for a date: `YYYY`, `MM-Month`, `DD`.
pub fn folder_segments(date: NaiveDate) -> Vec<String> {
    vec![
        date.format("%Y").to_string(),
        date.format("%m-%B").to_string(),
        date.format("%d").to_string(),
    ]
}

/// Temporary sibling used while replacing `path`.
pub(crate) fn temp_path_for(path: &Path) -> std::path::PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Write bytes to the temporary sibling of `path` and flush them to disk.
///
/// The target itself is untouched until the caller renames the temp file.
pub(crate) async fn write_temp(path: &Path, bytes: &[u8]) -> Result<std::path::PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let tmp = temp_path_for(path);
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    Ok(tmp)
}

/// Write bytes atomically (write to temp, then rename).
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = write_temp(path, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_folder_segments() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        assert_eq!(folder_segments(date), vec!["2025", "11-November", "03"]);
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let tmp = temp_path_for(Path::new("/var/state/blog.json"));
        assert_eq!(tmp, Path::new("/var/state/.blog.json.tmp"));
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out.json");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!temp_path_for(&path).exists());
    }
}
