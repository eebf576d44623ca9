use std::path::{Component, Path, PathBuf};

use crate::db::new_id;
use crate::images::domain::UploadedFile;

/// Uploaded files on local disk, served under `/uploads`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

/// Where a saved file landed. `path` is relative to the store root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub filename: String,
    pub path: String,
    pub url: String,
    pub size: i64,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn save(&self, directory: &str, file: &UploadedFile) -> std::io::Result<StoredFile> {
        let filename = format!("{}.{}", new_id(), file.extension());
        let dir = self.root.join(directory);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&filename), &file.bytes).await?;

        let path = format!("{}/{}", directory, filename);
        tracing::debug!(%path, size = file.bytes.len(), "Stored upload");
        Ok(StoredFile {
            url: format!("/uploads/{}", path),
            filename,
            path,
            size: file.bytes.len() as i64,
        })
    }

    /// Best effort: a file that is already gone is fine, other failures are logged.
    pub async fn remove(&self, relative: &str) {
        let Some(full) = self.resolve(relative) else {
            tracing::warn!(path = relative, "Refusing to remove path outside uploads");
            return;
        };
        match tokio::fs::remove_file(&full).await {
            Ok(()) => tracing::debug!(path = relative, "Removed upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = relative, "Failed to remove upload: {}", e),
        }
    }

    pub async fn remove_all(&self, paths: &[String]) {
        for path in paths {
            self.remove(path).await;
        }
    }

    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let rel = Path::new(relative);
        let safe = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        safe.then(|| self.root.join(rel))
    }
}
