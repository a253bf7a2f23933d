//! Transactional reassignment of legacy images to a fixed-id bucket.

use crate::db::bucket::BucketRepository;
use crate::db::image::ImageRepository;
use crate::db::transaction::TransactionGuard;
use oneimg_core::models::{Bucket, NewBucket};
use oneimg_core::AppError;
use sqlx::PgPool;

#[derive(Clone)]
pub struct MigrationRepository {
    pool: PgPool,
    buckets: BucketRepository,
    images: ImageRepository,
}

impl MigrationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            buckets: BucketRepository::new(pool.clone()),
            images: ImageRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create (or top up) the bucket and move `image_ids` into it, all or nothing.
    #[tracing::instrument(skip(self, bucket, image_ids), fields(kind = %bucket.kind, count = image_ids.len()))]
    pub async fn assign_partition(
        &self,
        id: i32,
        bucket: NewBucket,
        image_ids: &[i32],
    ) -> Result<Bucket, AppError> {
        let mut guard = TransactionGuard::begin(&self.pool).await?;

        let created = self.buckets.upsert_fixed_tx(guard.tx()?, id, &bucket).await;
        let created = match created {
            Ok(Some(b)) => b,
            Ok(None) => {
                guard.rollback().await?;
                return Err(AppError::Conflict(format!(
                    "Bucket id {} is already used by a bucket of another kind",
                    id
                )));
            }
            Err(e) => {
                guard.rollback().await?;
                return Err(e);
            }
        };

        if let Err(e) = self.images.assign_bucket_tx(guard.tx()?, image_ids, id).await {
            guard.rollback().await?;
            return Err(e);
        }

        guard.commit().await?;
        Ok(created)
    }
}
