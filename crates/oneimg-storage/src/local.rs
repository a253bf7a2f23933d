use crate::error::{StorageError, StorageResult};
use crate::keys;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage rooted at the uploads directory.
///
/// Keys keep their `uploads/` prefix; on disk the prefix maps onto `base_path`, so
/// `uploads/2024/03/a.webp` lands in `{base_path}/2024/03/a.webp`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert storage key to filesystem path, refusing keys that escape the root.
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        if storage_key.contains("..") || storage_key.starts_with('/') {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }

        let path = self.base_path.join(keys::relative_to_uploads(storage_key));

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        } else if path.strip_prefix(&self.base_path).is_err() {
            return Err(StorageError::InvalidKey(
                "Storage key resolves outside storage directory".to_string(),
            ));
        }

        Ok(path)
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    pub async fn put(&self, storage_key: &str, data: &Bytes) -> StorageResult<()> {
        let path = self.key_to_path(storage_key)?;
        let size = data.len();

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %storage_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(())
    }

    pub async fn get(&self, storage_key: &str) -> StorageResult<Bytes> {
        let path = self.key_to_path(storage_key)?;

        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(storage_key.to_string()))
            }
            Err(e) => Err(StorageError::DownloadFailed(format!(
                "Failed to read file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Remove one file. A file that is already gone is not an error.
    pub async fn remove(&self, storage_key: &str) -> StorageResult<()> {
        let path = self.key_to_path(storage_key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), key = %storage_key, "Local file removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Best-effort removal of an image's files; false only when the primary could not be removed.
    pub async fn delete_object(&self, primary_key: &str, thumbnail_key: Option<&str>) -> bool {
        let start = std::time::Instant::now();

        let primary_ok = match self.remove(primary_key).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %primary_key, error = %e, "Local storage delete failed");
                false
            }
        };

        if let Some(thumb) = thumbnail_key {
            if let Err(e) = self.remove(thumb).await {
                tracing::warn!(key = %thumb, error = %e, "Local thumbnail delete failed");
            }
        }

        tracing::info!(
            key = %primary_key,
            success = primary_ok,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete finished"
        );

        primary_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get_under_dated_dirs() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let data = Bytes::from_static(b"test data");
        storage.put("uploads/2024/03/a.png", &data).await.unwrap();

        assert!(dir.path().join("2024/03/a.png").exists());
        assert_eq!(storage.get("uploads/2024/03/a.png").await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let result = storage.get("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.remove("uploads/../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.put("/etc/passwd", &Bytes::new()).await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_missing_file_counts_as_deleted() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        assert!(storage.remove("uploads/2024/01/nonexistent.png").await.is_ok());
        assert!(
            storage
                .delete_object(
                    "uploads/2024/01/nonexistent.png",
                    Some("uploads/2024/01/thumbnails/nonexistent.png")
                )
                .await
        );
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let result = storage.get("uploads/2024/01/nope.png").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_both_files() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let data = Bytes::from_static(b"x");
        storage.put("uploads/2024/01/a.webp", &data).await.unwrap();
        storage
            .put("uploads/2024/01/thumbnails/a.webp", &data)
            .await
            .unwrap();

        assert!(
            storage
                .delete_object("uploads/2024/01/a.webp", Some("uploads/2024/01/thumbnails/a.webp"))
                .await
        );
        assert!(!dir.path().join("2024/01/a.webp").exists());
        assert!(!dir.path().join("2024/01/thumbnails/a.webp").exists());
    }

    #[tokio::test]
    async fn test_unexpected_primary_error_reports_failure() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        // A directory where the primary file should be cannot be removed as a file.
        std::fs::create_dir_all(dir.path().join("2024/01/a.webp")).unwrap();

        assert!(!storage.delete_object("uploads/2024/01/a.webp", None).await);
    }
}
