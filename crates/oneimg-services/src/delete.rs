//! Single-image delete: best-effort remote removal, then record and ledger.

use oneimg_core::models::{upload_fingerprint, Actor, DeleteOutcome, Image, TelegramObjectRef};
use oneimg_core::{AppConfig, AppError, BucketKind};
use oneimg_storage::Backend;
use std::sync::Arc;

use crate::quota::QuotaLedger;
use crate::stores::Stores;

/// Admins may delete anything; others only images whose fingerprint they own.
pub fn can_delete(actor: &Actor, image: &Image) -> bool {
    actor.is_admin
        || (actor.uuid == image.uuid
            && upload_fingerprint(&actor.username, &image.file_name) == image.md5)
}

#[derive(Clone)]
pub struct DeleteService {
    config: Arc<AppConfig>,
    stores: Stores,
    quota: QuotaLedger,
}

impl DeleteService {
    pub fn new(config: Arc<AppConfig>, stores: Stores) -> Self {
        Self {
            quota: QuotaLedger::new(stores.buckets.clone()),
            config,
            stores,
        }
    }

    pub async fn delete(&self, image_id: i32, actor: &Actor) -> Result<DeleteOutcome, AppError> {
        let image = self
            .stores
            .images
            .get_image(image_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", image_id)))?;

        if !can_delete(actor, &image) {
            return Err(AppError::Forbidden(format!(
                "{} may not delete image {}",
                actor.username, image_id
            )));
        }

        let bucket_id = image.bucket_id.unwrap_or_default();
        let bucket = self
            .stores
            .buckets
            .get_bucket(bucket_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bucket {} not found", bucket_id)))?;

        let physical_delete_succeeded = match Backend::for_bucket(&bucket, &self.config).await {
            Ok(backend) => {
                let object_ref = self.telegram_ref(&bucket.kind, &image).await;
                backend.delete(&image, object_ref.as_ref()).await
            }
            Err(e) => {
                tracing::warn!(image_id, bucket_id, error = %e, "Storage backend unavailable for delete");
                false
            }
        };

        let record_deleted = self.stores.images.delete_image(image_id).await?;
        if record_deleted {
            self.quota.debit(bucket_id, image.file_size).await;
        }

        if let Err(e) = self.stores.tags.unlink_image(image_id).await {
            tracing::warn!(image_id, error = %e, "Tag unlink failed");
        }

        if bucket.kind == BucketKind::Telegram {
            if let Err(e) = self.stores.telegram.delete_ref(&image.file_name).await {
                tracing::warn!(image_id, error = %e, "Telegram ref delete failed");
            }
        }

        if !physical_delete_succeeded {
            tracing::warn!(image_id, bucket_id, url = %image.url, "Stored object may be orphaned");
        }
        tracing::info!(image_id, bucket_id, physical_delete_succeeded, "Image deleted");

        Ok(DeleteOutcome {
            record_deleted,
            physical_delete_succeeded,
        })
    }

    /// Ref lookup for Telegram buckets. A failed lookup yields zeroed ids.
    async fn telegram_ref(&self, kind: &BucketKind, image: &Image) -> Option<TelegramObjectRef> {
        if *kind != BucketKind::Telegram {
            return None;
        }
        match self.stores.telegram.get_ref(&image.file_name).await {
            Ok(Some(r)) => Some(r),
            Ok(None) => Some(TelegramObjectRef::zeroed(&image.file_name)),
            Err(e) => {
                tracing::warn!(image_id = image.id, error = %e, "Telegram ref lookup failed");
                Some(TelegramObjectRef::zeroed(&image.file_name))
            }
        }
    }
}
