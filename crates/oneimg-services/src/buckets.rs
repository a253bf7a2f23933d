//! Bucket administration.

use oneimg_core::models::{Bucket, BucketSummary, CreateBucketRequest, NewBucket, UpdateBucketRequest};
use oneimg_core::{capacity_from_gb, AppError, BackendConfig, BucketKind, DEFAULT_BUCKET_ID};
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::stores::Stores;

/// Rows removed per statement during a bucket purge.
pub const PURGE_BATCH_SIZE: i64 = 1000;
pub const BULK_DELETE_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// What a bucket delete removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BucketPurge {
    pub tag_links_removed: u64,
    pub images_removed: u64,
    pub default_storage_reset: bool,
}

#[derive(Clone)]
pub struct BucketAdminService {
    stores: Stores,
}

impl BucketAdminService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn create(&self, request: CreateBucketRequest) -> Result<Bucket, AppError> {
        if request.kind == BucketKind::Default {
            return Err(AppError::BadRequest(
                "Only one default bucket may exist".to_string(),
            ));
        }

        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidInput("Bucket name is required".to_string()));
        }

        let config = BackendConfig::from_map(request.kind, &request.config)?;
        config.validate()?;
        let capacity = capacity_from_gb(&request.capacity_gb)?;

        if self.stores.buckets.name_taken(name, None).await? {
            return Err(AppError::Conflict(format!("Bucket name {} is taken", name)));
        }

        let bucket = self
            .stores
            .buckets
            .create_bucket(NewBucket {
                id: None,
                name: name.to_string(),
                kind: request.kind,
                capacity,
                usage: 0,
                config,
            })
            .await?;

        tracing::info!(bucket_id = bucket.id, kind = %bucket.kind, capacity, "Bucket created");
        Ok(bucket)
    }

    pub async fn update(&self, id: i32, request: UpdateBucketRequest) -> Result<Bucket, AppError> {
        if id == DEFAULT_BUCKET_ID {
            return Err(AppError::ImmutableBucket(id));
        }
        let bucket = self.require(id).await?;

        let name = match request.name.as_deref().map(str::trim) {
            Some("") => {
                return Err(AppError::InvalidInput("Bucket name is required".to_string()));
            }
            Some(name) => name.to_string(),
            None => bucket.name.clone(),
        };
        if name != bucket.name && self.stores.buckets.name_taken(&name, Some(id)).await? {
            return Err(AppError::Conflict(format!("Bucket name {} is taken", name)));
        }

        let capacity = match request.capacity_gb.as_deref() {
            Some(gb) => capacity_from_gb(gb)?,
            None => bucket.capacity,
        };
        if bucket.kind != BucketKind::Telegram && capacity < bucket.usage {
            return Err(AppError::InvalidInput(format!(
                "Capacity {} is below current usage {}",
                capacity, bucket.usage
            )));
        }

        let config = match &request.config {
            Some(map) => BackendConfig::from_map(bucket.kind, map)?,
            None => bucket.config.clone(),
        };
        config.validate()?;

        let updated = self
            .stores
            .buckets
            .update_bucket(id, &name, capacity, &config)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bucket {} not found", id)))?;

        tracing::info!(bucket_id = id, capacity, "Bucket updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: i32) -> Result<BucketPurge, AppError> {
        self.delete_with_deadline(id, BULK_DELETE_DEADLINE).await
    }

    /// Remove a bucket's tag links and images in batches, then the bucket row.
    ///
    /// Stored objects are left in place. If the deadline passes the bucket row is
    /// kept and the call can be repeated to resume.
    pub async fn delete_with_deadline(
        &self,
        id: i32,
        deadline: Duration,
    ) -> Result<BucketPurge, AppError> {
        if id == DEFAULT_BUCKET_ID {
            return Err(AppError::ImmutableBucket(id));
        }
        self.require(id).await?;

        let start = Instant::now();
        let mut purge = BucketPurge::default();
        if tokio::time::timeout(deadline, self.purge_members(id, &mut purge))
            .await
            .is_err()
        {
            tracing::warn!(
                bucket_id = id,
                tag_links_removed = purge.tag_links_removed,
                images_removed = purge.images_removed,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Bucket purge hit its deadline"
            );
            return Err(AppError::DeadlineExceeded(format!(
                "bucket {} purge stopped after {} images",
                id, purge.images_removed
            )));
        }

        self.stores.buckets.delete_bucket(id).await?;
        purge.default_storage_reset = self.stores.settings.reset_default_storage_if(id).await?;

        tracing::info!(
            bucket_id = id,
            tag_links_removed = purge.tag_links_removed,
            images_removed = purge.images_removed,
            default_storage_reset = purge.default_storage_reset,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Bucket deleted"
        );
        Ok(purge)
    }

    async fn purge_members(&self, id: i32, purge: &mut BucketPurge) -> Result<(), AppError> {
        loop {
            let removed = self.stores.tags.unlink_in_bucket(id, PURGE_BATCH_SIZE).await?;
            if removed == 0 {
                break;
            }
            purge.tag_links_removed += removed;
        }
        loop {
            let removed = self
                .stores
                .images
                .delete_images_in_bucket(id, PURGE_BATCH_SIZE)
                .await?;
            if removed == 0 {
                break;
            }
            purge.images_removed += removed;
        }
        Ok(())
    }

    /// Buckets that can still take uploads. Credentials are not included.
    pub async fn list_uploadable(&self) -> Result<Vec<BucketSummary>, AppError> {
        Ok(self
            .stores
            .buckets
            .list_buckets()
            .await?
            .iter()
            .filter(|b| !b.is_full())
            .map(BucketSummary::from)
            .collect())
    }

    async fn require(&self, id: i32) -> Result<Bucket, AppError> {
        self.stores
            .buckets
            .get_bucket(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bucket {} not found", id)))
    }
}
