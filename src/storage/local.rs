//! Local filesystem archive for article attachments.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! └── YYYY/
//!     └── MM-Month/
//!         └── DD/
//!             └── {file name}
//! ```
//!
//! Links are `{link_base}/{relative path}` when a link base is configured
//! (e.g. a web server or synced drive exposing the root), otherwise
//! `file://` URLs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use url::Url;

use crate::error::{AppError, Result};
use crate::storage::{FileStorage, FolderId, write_atomic};

/// Local filesystem archive backend.
#[derive(Debug, Clone)]
pub struct LocalArchive {
    root_dir: PathBuf,
    link_base: Option<String>,
}

impl LocalArchive {
    /// Create a new LocalArchive rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            link_base: None,
        }
    }

    /// Use `link_base` as the prefix for returned links.
    pub fn with_link_base(mut self, link_base: impl Into<String>) -> Self {
        self.link_base = Some(link_base.into());
        self
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    fn link_for(&self, key: &str) -> Result<String> {
        match &self.link_base {
            Some(base) => Ok(format!("{}/{}", base.trim_end_matches('/'), key)),
            None => {
                let absolute = std::path::absolute(self.path(key))?;
                Url::from_file_path(&absolute)
                    .map(|u| u.to_string())
                    .map_err(|_| {
                        AppError::config(format!("cannot link {}", absolute.display()))
                    })
            }
        }
    }
}

#[async_trait]
impl FileStorage for LocalArchive {
    async fn ensure_folder(&self, segments: &[String]) -> Result<FolderId> {
        if segments
            .iter()
            .any(|s| s.is_empty() || s == ".." || s.contains(['/', '\\']))
        {
            return Err(AppError::validation(format!(
                "invalid folder segments: {segments:?}"
            )));
        }

        let key = segments.join("/");
        tokio::fs::create_dir_all(self.path(&key)).await?;
        Ok(FolderId(key))
    }

    async fn upload(&self, local_path: &Path, folder: &FolderId) -> Result<String> {
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                AppError::validation(format!("no file name in {}", local_path.display()))
            })?;

        let bytes = tokio::fs::read(local_path).await?;
        let key = format!("{}/{}", folder.0, file_name);
        write_atomic(&self.path(&key), &bytes).await?;

        log::info!("Archived {} to {}", local_path.display(), key);
        self.link_for(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_into_dated_folder() {
        let root = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let pdf = src.path().join("01-article.pdf");
        std::fs::write(&pdf, b"%PDF-1.4").unwrap();

        let archive = LocalArchive::new(root.path()).with_link_base("https://files.example/");
        let folder = archive
            .ensure_folder(&["2026".into(), "01-January".into(), "31".into()])
            .await
            .unwrap();
        let link = archive.upload(&pdf, &folder).await.unwrap();

        assert_eq!(
            link,
            "https://files.example/2026/01-January/31/01-article.pdf"
        );
        assert_eq!(
            std::fs::read(root.path().join("2026/01-January/31/01-article.pdf")).unwrap(),
            b"%PDF-1.4"
        );
    }

    #[tokio::test]
    async fn test_file_link_without_base() {
        let root = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let pdf = src.path().join("a.pdf");
        std::fs::write(&pdf, b"x").unwrap();

        let archive = LocalArchive::new(root.path());
        let folder = archive.ensure_folder(&["2026".into()]).await.unwrap();
        let link = archive.upload(&pdf, &folder).await.unwrap();

        assert!(link.starts_with("file://"));
        assert!(link.ends_with("/2026/a.pdf"));
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let root = TempDir::new().unwrap();
        let archive = LocalArchive::new(root.path());
        assert!(archive.ensure_folder(&["..".into()]).await.is_err());
        assert!(archive.ensure_folder(&["a/b".into()]).await.is_err());
    }

    #[tokio::test]
    async fn test_upload_missing_file_fails() {
        let root = TempDir::new().unwrap();
        let archive = LocalArchive::new(root.path());
        let folder = archive.ensure_folder(&["2026".into()]).await.unwrap();
        assert!(archive
            .upload(Path::new("/nonexistent/x.pdf"), &folder)
            .await
            .is_err());
    }
}
