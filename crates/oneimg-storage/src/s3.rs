use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    Result as ObjectResult,
};
use oneimg_core::{BucketKind, S3Config};
use std::sync::Arc;
use std::time::Duration;

/// Window for removing an image and its thumbnail.
pub const DELETE_TIMEOUT: Duration = Duration::from_secs(30);

/// S3-compatible storage (AWS S3 or Cloudflare R2) for one bucket's credentials.
#[derive(Clone)]
pub struct S3Storage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    kind: BucketKind,
    delete_timeout: Duration,
}

impl std::fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("bucket", &self.bucket)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl S3Storage {
    pub fn new(kind: BucketKind, config: &S3Config) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_region(S3Config::region_for(kind))
            .with_bucket_name(config.bucket.clone())
            .with_access_key_id(config.access_key.clone())
            .with_secret_access_key(config.secret_key.clone());

        if !config.endpoint.is_empty() {
            let allow_http = config.endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(config.endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self::with_store(Arc::new(store), config.bucket.clone(), kind))
    }

    /// Wrap an already built object store.
    pub fn with_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, kind: BucketKind) -> Self {
        S3Storage {
            store,
            bucket: bucket.into(),
            kind,
            delete_timeout: DELETE_TIMEOUT,
        }
    }

    pub fn with_delete_timeout(mut self, timeout: Duration) -> Self {
        self.delete_timeout = timeout;
        self
    }

    /// `s3` or `r2`.
    pub fn kind(&self) -> BucketKind {
        self.kind
    }

    pub async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        let size = data.len() as u64;
        let location = Path::from(key);

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self
            .store
            .put_opts(&location, PutPayload::from(data), opts)
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            content_type = %content_type,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(())
    }

    pub async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let location = Path::from(key);

        let result: ObjectResult<_> = self.store.get(&location).await;
        let response = match result {
            Ok(r) => r,
            Err(ObjectStoreError::NotFound { .. }) => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(StorageError::DownloadFailed(e.to_string())),
        };

        response
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))
    }

    async fn remove_both(&self, primary_key: &str, thumbnail_key: Option<&str>) -> StorageResult<()> {
        self.store
            .delete(&Path::from(primary_key))
            .await
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;

        if let Some(thumb) = thumbnail_key {
            self.store
                .delete(&Path::from(thumb))
                .await
                .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// Delete the primary then the thumbnail within one timeout window.
    pub async fn delete_object(&self, primary_key: &str, thumbnail_key: Option<&str>) -> bool {
        let start = std::time::Instant::now();

        let outcome = match tokio::time::timeout(
            self.delete_timeout,
            self.remove_both(primary_key, thumbnail_key),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(format!(
                "S3 delete of {} exceeded {:?}",
                primary_key, self.delete_timeout
            ))),
        };

        match outcome {
            Ok(()) => {
                tracing::info!(
                    bucket = %self.bucket,
                    key = %primary_key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete successful"
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %primary_key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                false
            }
        }
    }
}
