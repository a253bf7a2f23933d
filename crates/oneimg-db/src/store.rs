//! Store traits for the pipeline services
//!
//! These traits define the minimal interface the upload, delete, bucket admin and
//! migration services need from the database, so the services can be exercised with
//! in-memory fakes.

use async_trait::async_trait;
use oneimg_core::models::{
    Bucket, Image, ImageStorageInfo, NewBucket, NewImage, Settings, Tag, TelegramObjectRef,
};
use oneimg_core::{AppError, BackendConfig};

use crate::db::{
    BucketRepository, ImageRepository, MigrationRepository, SettingsRepository, TagRepository,
    TelegramRefRepository,
};

#[async_trait]
pub trait BucketStore: Send + Sync {
    async fn get_bucket(&self, id: i32) -> Result<Option<Bucket>, AppError>;

    async fn list_buckets(&self) -> Result<Vec<Bucket>, AppError>;

    async fn bucket_ids(&self) -> Result<Vec<i32>, AppError>;

    async fn name_taken(&self, name: &str, exclude_id: Option<i32>) -> Result<bool, AppError>;

    async fn create_bucket(&self, bucket: NewBucket) -> Result<Bucket, AppError>;

    async fn update_bucket(
        &self,
        id: i32,
        name: &str,
        capacity: i64,
        config: &BackendConfig,
    ) -> Result<Option<Bucket>, AppError>;

    async fn delete_bucket(&self, id: i32) -> Result<bool, AppError>;

    /// Conditional credit. Returns the number of rows updated (0 or 1).
    async fn credit_usage(&self, id: i32, bytes: i64) -> Result<u64, AppError>;

    /// Conditional debit. Returns the number of rows updated (0 or 1).
    async fn debit_usage(&self, id: i32, bytes: i64) -> Result<u64, AppError>;

    /// Atomically create (or top up) bucket `id` and move `image_ids` into it.
    async fn assign_partition(
        &self,
        id: i32,
        bucket: NewBucket,
        image_ids: &[i32],
    ) -> Result<Bucket, AppError>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn get_image(&self, id: i32) -> Result<Option<Image>, AppError>;

    async fn create_image(&self, image: NewImage) -> Result<Image, AppError>;

    async fn delete_image(&self, id: i32) -> Result<bool, AppError>;

    async fn list_storage_info(&self) -> Result<Vec<ImageStorageInfo>, AppError>;

    async fn assign_bucket(&self, ids: &[i32], bucket_id: i32) -> Result<u64, AppError>;

    async fn delete_images_in_bucket(&self, bucket_id: i32, limit: i64) -> Result<u64, AppError>;
}

#[async_trait]
pub trait TagStore: Send + Sync {
    async fn existing_tags(&self, ids: &[i32]) -> Result<Vec<Tag>, AppError>;

    async fn link_tags(&self, image_id: i32, tag_ids: &[i32]) -> Result<u64, AppError>;

    async fn unlink_image(&self, image_id: i32) -> Result<u64, AppError>;

    async fn unlink_in_bucket(&self, bucket_id: i32, limit: i64) -> Result<u64, AppError>;
}

#[async_trait]
pub trait TelegramRefStore: Send + Sync {
    async fn save_ref(&self, object_ref: &TelegramObjectRef) -> Result<(), AppError>;

    async fn get_ref(&self, file_name: &str) -> Result<Option<TelegramObjectRef>, AppError>;

    async fn delete_ref(&self, file_name: &str) -> Result<bool, AppError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_settings(&self) -> Result<Settings, AppError>;

    /// Reset `default_storage` to the default bucket when it points at `bucket_id`.
    async fn reset_default_storage_if(&self, bucket_id: i32) -> Result<bool, AppError>;
}

/// Postgres-backed implementation of every store trait.
#[derive(Clone)]
pub struct PgStores {
    pub buckets: BucketRepository,
    pub images: ImageRepository,
    pub tags: TagRepository,
    pub telegram: TelegramRefRepository,
    pub settings: SettingsRepository,
    pub migration: MigrationRepository,
}

impl PgStores {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            buckets: BucketRepository::new(pool.clone()),
            images: ImageRepository::new(pool.clone()),
            tags: TagRepository::new(pool.clone()),
            telegram: TelegramRefRepository::new(pool.clone()),
            settings: SettingsRepository::new(pool.clone()),
            migration: MigrationRepository::new(pool),
        }
    }
}

#[async_trait]
impl BucketStore for PgStores {
    async fn get_bucket(&self, id: i32) -> Result<Option<Bucket>, AppError> {
        self.buckets.get(id).await
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>, AppError> {
        self.buckets.list().await
    }

    async fn bucket_ids(&self) -> Result<Vec<i32>, AppError> {
        self.buckets.existing_ids().await
    }

    async fn name_taken(&self, name: &str, exclude_id: Option<i32>) -> Result<bool, AppError> {
        self.buckets.name_taken(name, exclude_id).await
    }

    async fn create_bucket(&self, bucket: NewBucket) -> Result<Bucket, AppError> {
        self.buckets.create(bucket).await
    }

    async fn update_bucket(
        &self,
        id: i32,
        name: &str,
        capacity: i64,
        config: &BackendConfig,
    ) -> Result<Option<Bucket>, AppError> {
        self.buckets.update(id, name, capacity, config).await
    }

    async fn delete_bucket(&self, id: i32) -> Result<bool, AppError> {
        self.buckets.delete(id).await
    }

    async fn credit_usage(&self, id: i32, bytes: i64) -> Result<u64, AppError> {
        self.buckets.credit_usage(id, bytes).await
    }

    async fn debit_usage(&self, id: i32, bytes: i64) -> Result<u64, AppError> {
        self.buckets.debit_usage(id, bytes).await
    }

    async fn assign_partition(
        &self,
        id: i32,
        bucket: NewBucket,
        image_ids: &[i32],
    ) -> Result<Bucket, AppError> {
        self.migration.assign_partition(id, bucket, image_ids).await
    }
}

#[async_trait]
impl ImageStore for PgStores {
    async fn get_image(&self, id: i32) -> Result<Option<Image>, AppError> {
        self.images.get(id).await
    }

    async fn create_image(&self, image: NewImage) -> Result<Image, AppError> {
        self.images.create(image).await
    }

    async fn delete_image(&self, id: i32) -> Result<bool, AppError> {
        self.images.delete(id).await
    }

    async fn list_storage_info(&self) -> Result<Vec<ImageStorageInfo>, AppError> {
        self.images.list_storage_info().await
    }

    async fn assign_bucket(&self, ids: &[i32], bucket_id: i32) -> Result<u64, AppError> {
        self.images.assign_bucket(ids, bucket_id).await
    }

    async fn delete_images_in_bucket(&self, bucket_id: i32, limit: i64) -> Result<u64, AppError> {
        self.images.delete_batch_in_bucket(bucket_id, limit).await
    }
}

#[async_trait]
impl TagStore for PgStores {
    async fn existing_tags(&self, ids: &[i32]) -> Result<Vec<Tag>, AppError> {
        self.tags.existing(ids).await
    }

    async fn link_tags(&self, image_id: i32, tag_ids: &[i32]) -> Result<u64, AppError> {
        self.tags.link(image_id, tag_ids).await
    }

    async fn unlink_image(&self, image_id: i32) -> Result<u64, AppError> {
        self.tags.unlink_image(image_id).await
    }

    async fn unlink_in_bucket(&self, bucket_id: i32, limit: i64) -> Result<u64, AppError> {
        self.tags.unlink_batch_in_bucket(bucket_id, limit).await
    }
}

#[async_trait]
impl TelegramRefStore for PgStores {
    async fn save_ref(&self, object_ref: &TelegramObjectRef) -> Result<(), AppError> {
        self.telegram.create(object_ref).await
    }

    async fn get_ref(&self, file_name: &str) -> Result<Option<TelegramObjectRef>, AppError> {
        self.telegram.get_by_file_name(file_name).await
    }

    async fn delete_ref(&self, file_name: &str) -> Result<bool, AppError> {
        self.telegram.delete_by_file_name(file_name).await
    }
}

#[async_trait]
impl SettingsStore for PgStores {
    async fn get_settings(&self) -> Result<Settings, AppError> {
        self.settings.get().await
    }

    async fn reset_default_storage_if(&self, bucket_id: i32) -> Result<bool, AppError> {
        self.settings.reset_default_storage_if(bucket_id).await
    }
}
