//! Upload pipeline: admission, processing, storage, record, ledger credit.

use bytes::Bytes;
use chrono::{Local, Utc};
use oneimg_core::models::{
    upload_fingerprint, Bucket, Image, NewImage, Settings, TelegramObjectRef, UploadFile,
    UploadResult, Uploader,
};
use oneimg_core::{AppConfig, AppError};
use oneimg_processing::{ImageEngine, UploadValidator};
use oneimg_storage::{Backend, StoredObject};
use std::sync::Arc;
use std::time::Instant;

use crate::notify::{NoticeContext, Notifier};
use crate::quota::QuotaLedger;
use crate::stores::Stores;

#[derive(Clone)]
pub struct UploadService {
    config: Arc<AppConfig>,
    stores: Stores,
    quota: QuotaLedger,
    engine: Arc<ImageEngine>,
    validator: UploadValidator,
    notifier: Notifier,
    /// Prefixed to stored urls in notices.
    public_host: String,
}

impl UploadService {
    pub fn new(config: Arc<AppConfig>, stores: Stores) -> Self {
        let engine = Arc::new(ImageEngine::new(config.watermark_font_path.clone()));
        Self::with_engine(config, stores, engine)
    }

    pub fn with_engine(config: Arc<AppConfig>, stores: Stores, engine: Arc<ImageEngine>) -> Self {
        let validator = UploadValidator::new(config.max_file_size, config.allowed_types.clone());
        let notifier = Notifier::new(config.telegram_api_base.clone());
        Self {
            quota: QuotaLedger::new(stores.buckets.clone()),
            config,
            stores,
            engine,
            validator,
            notifier,
            public_host: String::new(),
        }
    }

    pub fn with_public_host(mut self, host: impl Into<String>) -> Self {
        self.public_host = host.into().trim_end_matches('/').to_string();
        self
    }

    /// Upload a batch into `bucket_id`, or the configured default bucket.
    ///
    /// The whole batch is admitted against the bucket's capacity up front; the first
    /// failing file aborts the rest. Files stored before the failure stay stored.
    pub async fn upload_batch(
        &self,
        files: Vec<UploadFile>,
        bucket_id: Option<i32>,
        uploader: &Uploader,
        tag_ids: &[i32],
    ) -> Result<Vec<UploadResult>, AppError> {
        if files.is_empty() {
            return Err(AppError::BadRequest("No files to upload".to_string()));
        }

        let settings = self.stores.settings.get_settings().await?;
        let bucket_id = bucket_id.unwrap_or(settings.default_storage);
        let bucket = self
            .stores
            .buckets
            .get_bucket(bucket_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bucket {} not found", bucket_id)))?;

        let incoming: i64 = files.iter().map(UploadFile::size).sum();
        self.quota.admit(&bucket, incoming)?;

        let backend = Backend::for_bucket(&bucket, &self.config).await?;

        let tag_ids: Vec<i32> = if tag_ids.is_empty() {
            Vec::new()
        } else {
            self.stores
                .tags
                .existing_tags(tag_ids)
                .await?
                .into_iter()
                .map(|t| t.id)
                .collect()
        };

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            let result = self
                .store_file(file, &bucket, &backend, &settings, uploader, &tag_ids)
                .await?;
            results.push(result);
        }

        tracing::info!(
            bucket_id = bucket.id,
            count = results.len(),
            size_bytes = incoming,
            "Upload batch stored"
        );
        Ok(results)
    }

    /// Upload one file into an already resolved bucket.
    pub async fn upload(
        &self,
        file: UploadFile,
        bucket: &Bucket,
        uploader: &Uploader,
    ) -> Result<UploadResult, AppError> {
        let settings = self.stores.settings.get_settings().await?;
        self.quota.admit(bucket, file.size())?;
        let backend = Backend::for_bucket(bucket, &self.config).await?;
        self.store_file(file, bucket, &backend, &settings, uploader, &[])
            .await
    }

    async fn store_file(
        &self,
        file: UploadFile,
        bucket: &Bucket,
        backend: &Backend,
        settings: &Settings,
        uploader: &Uploader,
        tag_ids: &[i32],
    ) -> Result<UploadResult, AppError> {
        let start = Instant::now();
        self.validator.validate(file.data.len(), &file.content_type)?;

        let artifact = self
            .engine
            .process(
                Bytes::from(file.data),
                file.content_type,
                file.file_name,
                settings.clone(),
            )
            .await?;

        let stored = backend
            .upload(&artifact, Utc::now(), settings.thumbnail)
            .await?;

        let image = self
            .stores
            .images
            .create_image(new_image(&stored, bucket, uploader))
            .await
            .map_err(|e| {
                tracing::error!(
                    bucket_id = bucket.id,
                    url = %stored.url,
                    error = %e,
                    "Image record insert failed after the object was stored"
                );
                e
            })?;

        if let Some(object_ref) = &stored.telegram {
            if let Err(e) = self.stores.telegram.save_ref(object_ref).await {
                tracing::error!(
                    image_id = image.id,
                    file_name = %object_ref.file_name,
                    error = %e,
                    "Telegram ref save failed, rolling back upload"
                );
                self.roll_back(&image, backend, object_ref).await;
                return Err(e);
            }
        }

        if !bucket.is_default() {
            self.quota.credit(bucket.id, image.file_size).await;
        }

        if !tag_ids.is_empty() {
            if let Err(e) = self.stores.tags.link_tags(image.id, tag_ids).await {
                tracing::warn!(image_id = image.id, error = %e, "Tag linking failed");
            }
        }

        if settings.notifications_enabled() {
            let notifier = self.notifier.clone();
            let settings = settings.clone();
            let ctx = NoticeContext {
                username: uploader.username.clone(),
                date: Local::now(),
                file_name: image.file_name.clone(),
                storage_type: bucket.kind.to_string(),
                url: format!("{}{}", self.public_host, image.url),
            };
            tokio::spawn(async move {
                notifier.notify(&settings, &ctx).await;
            });
        }

        tracing::info!(
            image_id = image.id,
            bucket_id = bucket.id,
            kind = %bucket.kind,
            size_bytes = image.file_size,
            mime_type = %image.mime_type,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Image uploaded"
        );

        Ok(UploadResult::from(&image))
    }

    /// Undo a Telegram upload whose message ids could not be recorded.
    async fn roll_back(&self, image: &Image, backend: &Backend, object_ref: &TelegramObjectRef) {
        if let Err(e) = self.stores.images.delete_image(image.id).await {
            tracing::error!(image_id = image.id, error = %e, "Image record rollback failed");
        }
        backend.delete(image, Some(object_ref)).await;
    }
}

fn new_image(stored: &StoredObject, bucket: &Bucket, uploader: &Uploader) -> NewImage {
    NewImage {
        url: stored.url.clone(),
        thumbnail: stored.thumbnail_url.clone(),
        file_name: stored.file_name.clone(),
        file_size: stored.size,
        mime_type: stored.mime_type.clone(),
        width: stored.width,
        height: stored.height,
        storage: bucket.kind.as_str().to_string(),
        bucket_id: bucket.id,
        user_id: uploader.user_id,
        md5: upload_fingerprint(&uploader.username, &stored.file_name),
        uuid: uploader.uuid.clone(),
    }
}
