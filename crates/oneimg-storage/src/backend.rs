//! The closed set of storage backends behind one upload/delete/fetch contract.

use crate::error::{StorageError, StorageResult};
use crate::ftp::FtpStorage;
use crate::keys;
use crate::local::LocalStorage;
use crate::s3::S3Storage;
use crate::telegram::{SentDocument, TelegramStorage, THUMBNAIL_PREFIX};
use crate::webdav::WebDavStorage;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use oneimg_core::models::{Bucket, Image, TelegramObjectRef};
use oneimg_core::{AppConfig, BackendConfig, BucketKind};
use oneimg_processing::ProcessedArtifact;
use serde::Serialize;

/// Result of writing one processed upload to a backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredObject {
    pub url: String,
    /// Empty when no thumbnail was written.
    pub thumbnail_url: String,
    pub file_name: String,
    pub size: i64,
    pub mime_type: String,
    pub width: i32,
    pub height: i32,
    /// Kind tag of the backend that holds the object.
    pub storage: String,
    /// Set only for Telegram.
    pub telegram: Option<TelegramObjectRef>,
}

#[derive(Debug, Clone)]
pub enum Backend {
    Local(LocalStorage),
    /// Serves both the `s3` and `r2` kinds.
    S3(S3Storage),
    Ftp(FtpStorage),
    WebDav(WebDavStorage),
    Telegram(TelegramStorage),
}

impl Backend {
    /// Build the backend described by a bucket's kind and connection descriptor.
    pub async fn for_bucket(bucket: &Bucket, config: &AppConfig) -> StorageResult<Self> {
        bucket
            .config
            .validate()
            .map_err(|e| StorageError::ConfigError(format!("bucket {}: {}", bucket.id, e)))?;

        let backend = match &bucket.config {
            BackendConfig::Local => Backend::Local(LocalStorage::new(&config.uploads_dir).await?),
            BackendConfig::S3(c) => Backend::S3(S3Storage::new(BucketKind::S3, c)?),
            BackendConfig::R2(c) => Backend::S3(S3Storage::new(BucketKind::R2, c)?),
            BackendConfig::Ftp(c) => Backend::Ftp(FtpStorage::new(c)),
            BackendConfig::WebDav(c) => Backend::WebDav(WebDavStorage::new(c)?),
            BackendConfig::Telegram(c) => {
                Backend::Telegram(TelegramStorage::new(&config.telegram_api_base, c)?)
            }
        };

        tracing::debug!(bucket_id = bucket.id, kind = %backend.kind(), "Storage backend ready");
        Ok(backend)
    }

    pub fn kind(&self) -> BucketKind {
        match self {
            Backend::Local(_) => BucketKind::Default,
            Backend::S3(s) => s.kind(),
            Backend::Ftp(_) => BucketKind::Ftp,
            Backend::WebDav(_) => BucketKind::WebDav,
            Backend::Telegram(_) => BucketKind::Telegram,
        }
    }

    async fn put(
        &self,
        key: &str,
        file_name: &str,
        data: Bytes,
        mime_type: &str,
    ) -> StorageResult<Option<SentDocument>> {
        match self {
            Backend::Local(s) => s.put(key, &data).await.map(|_| None),
            Backend::S3(s) => s.put(key, data, mime_type).await.map(|_| None),
            Backend::Ftp(s) => s.put(key, data).await.map(|_| None),
            Backend::WebDav(s) => s.put(key, data, mime_type).await.map(|_| None),
            Backend::Telegram(s) => s.put(file_name, data).await.map(Some),
        }
    }

    /// Write the primary object and, when enabled, its thumbnail.
    ///
    /// A failed primary write is returned; a failed thumbnail write leaves
    /// `thumbnail_url` empty.
    pub async fn upload(
        &self,
        artifact: &ProcessedArtifact,
        now: DateTime<Utc>,
        thumbnails_enabled: bool,
    ) -> StorageResult<StoredObject> {
        let name = &artifact.file_name;
        let primary_key = keys::primary_key(now, name);

        let primary = self
            .put(&primary_key, name, artifact.data.clone(), &artifact.mime_type)
            .await?;

        let mut thumbnail_url = String::new();
        let mut thumbnail_doc = None;
        if thumbnails_enabled {
            if let Some(thumb) = artifact.thumbnail.bytes() {
                let thumb_key = keys::thumbnail_key(now, name);
                let thumb_name = format!("{}{}", THUMBNAIL_PREFIX, name);
                let thumb_mime = artifact.thumbnail.mime_type(&artifact.mime_type);
                match self.put(&thumb_key, &thumb_name, thumb.clone(), &thumb_mime).await {
                    Ok(doc) => {
                        thumbnail_url = keys::public_url(&thumb_key);
                        thumbnail_doc = doc;
                    }
                    Err(e) => {
                        tracing::warn!(
                            key = %thumb_key,
                            kind = %self.kind(),
                            error = %e,
                            "Thumbnail upload failed, storing without thumbnail"
                        );
                    }
                }
            }
        }

        let telegram = primary.map(|doc| {
            let thumb = thumbnail_doc.unwrap_or(SentDocument {
                message_id: 0,
                file_id: String::new(),
            });
            TelegramObjectRef {
                file_name: name.clone(),
                file_id: doc.file_id,
                thumbnail_file_id: thumb.file_id,
                message_id: doc.message_id,
                thumbnail_message_id: thumb.message_id,
            }
        });

        Ok(StoredObject {
            url: keys::public_url(&primary_key),
            thumbnail_url,
            file_name: name.clone(),
            size: artifact.size(),
            mime_type: artifact.mime_type.clone(),
            width: i32::try_from(artifact.width).unwrap_or(i32::MAX),
            height: i32::try_from(artifact.height).unwrap_or(i32::MAX),
            storage: self.kind().as_str().to_string(),
            telegram,
        })
    }

    /// Best-effort removal of an image's stored objects. Never fails; the bool
    /// reports whether the physical delete is known to have succeeded.
    pub async fn delete(&self, image: &Image, telegram_ref: Option<&TelegramObjectRef>) -> bool {
        if let Backend::Telegram(s) = self {
            let r = telegram_ref
                .cloned()
                .unwrap_or_else(|| TelegramObjectRef::zeroed(&image.file_name));
            s.delete_messages(&[r.message_id, r.thumbnail_message_id]).await;
            return true;
        }

        let Some(primary_key) = keys::key_from_url(&image.url) else {
            tracing::warn!(image_id = image.id, "Image has no stored url, nothing to delete");
            return true;
        };
        let thumbnail_key = keys::key_from_url(&image.thumbnail);
        let thumbnail_key = thumbnail_key.as_deref();

        match self {
            Backend::Local(s) => s.delete_object(&primary_key, thumbnail_key).await,
            Backend::S3(s) => s.delete_object(&primary_key, thumbnail_key).await,
            Backend::Ftp(s) => s.delete_object(&primary_key, thumbnail_key).await,
            Backend::WebDav(s) => s.delete_object(&primary_key, thumbnail_key).await,
            Backend::Telegram(_) => true,
        }
    }

    /// Read an object back. For Telegram the key is the document's file id.
    pub async fn fetch(&self, key: &str) -> StorageResult<Bytes> {
        let key = key.trim_start_matches('/');
        match self {
            Backend::Local(s) => s.get(key).await,
            Backend::S3(s) => s.get(key).await,
            Backend::Ftp(s) => s.get(key).await,
            Backend::WebDav(s) => s.get(key).await,
            Backend::Telegram(s) => s.get(key).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Server;
    use oneimg_core::{TelegramConfig, WebDavConfig};
    use oneimg_processing::Thumbnail;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn app_config(uploads_dir: PathBuf, telegram_api_base: String) -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/oneimg".to_string(),
            db_max_connections: 1,
            db_timeout_seconds: 1,
            max_file_size: 1024,
            allowed_types: vec!["image/png".to_string()],
            uploads_dir,
            watermark_font_path: PathBuf::from("font.ttf"),
            telegram_api_base,
        }
    }

    fn bucket(id: i32, kind: BucketKind, config: BackendConfig) -> Bucket {
        Bucket {
            id,
            name: format!("bucket-{}", id),
            kind,
            capacity: 0,
            usage: 0,
            config,
        }
    }

    fn artifact(thumbnail: Thumbnail) -> ProcessedArtifact {
        ProcessedArtifact {
            data: Bytes::from_static(b"primary"),
            thumbnail,
            width: 40,
            height: 30,
            mime_type: "image/webp".to_string(),
            format: "webp".to_string(),
            file_name: "a.webp".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap()
    }

    fn image_from(stored: &StoredObject) -> Image {
        Image {
            id: 1,
            url: stored.url.clone(),
            thumbnail: stored.thumbnail_url.clone(),
            file_name: stored.file_name.clone(),
            file_size: stored.size,
            mime_type: stored.mime_type.clone(),
            width: stored.width,
            height: stored.height,
            storage: stored.storage.clone(),
            bucket_id: Some(1),
            user_id: 1,
            md5: String::new(),
            uuid: String::new(),
            created_at: now(),
        }
    }

    #[tokio::test]
    async fn test_local_upload_fetch_delete() {
        let dir = tempdir().unwrap();
        let config = app_config(dir.path().to_path_buf(), String::new());
        let backend = Backend::for_bucket(&bucket(1, BucketKind::Default, BackendConfig::Local), &config)
            .await
            .unwrap();
        assert_eq!(backend.kind(), BucketKind::Default);

        let generated = Thumbnail::Generated {
            data: Bytes::from_static(b"thumb"),
            mime_type: "image/webp",
        };
        let stored = backend.upload(&artifact(generated), now(), true).await.unwrap();

        assert_eq!(stored.url, "/uploads/2024/03/a.webp");
        assert_eq!(stored.thumbnail_url, "/uploads/2024/03/thumbnails/a.webp");
        assert_eq!(stored.storage, "default");
        assert_eq!((stored.width, stored.height, stored.size), (40, 30, 7));
        assert!(stored.telegram.is_none());
        assert!(dir.path().join("2024/03/thumbnails/a.webp").exists());

        let data = backend.fetch(&stored.url).await.unwrap();
        assert_eq!(data.as_ref(), b"primary");

        assert!(backend.delete(&image_from(&stored), None).await);
        assert!(!dir.path().join("2024/03/a.webp").exists());
        // Already gone counts as deleted.
        assert!(backend.delete(&image_from(&stored), None).await);
    }

    #[tokio::test]
    async fn test_thumbnails_disabled_or_absent() {
        let dir = tempdir().unwrap();
        let config = app_config(dir.path().to_path_buf(), String::new());
        let backend = Backend::for_bucket(&bucket(1, BucketKind::Default, BackendConfig::Local), &config)
            .await
            .unwrap();

        let degraded = Thumbnail::Degraded(Bytes::from_static(b"<svg/>"));
        let stored = backend.upload(&artifact(degraded), now(), false).await.unwrap();
        assert_eq!(stored.thumbnail_url, "");

        let stored = backend.upload(&artifact(Thumbnail::Absent), now(), true).await.unwrap();
        assert_eq!(stored.thumbnail_url, "");
    }

    #[tokio::test]
    async fn test_placeholder_config_is_rejected() {
        let dir = tempdir().unwrap();
        let config = app_config(dir.path().to_path_buf(), String::new());
        let placeholder = bucket(4, BucketKind::Ftp, BackendConfig::placeholder(BucketKind::Ftp));

        let result = Backend::for_bucket(&placeholder, &config).await;
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_thumbnail_failure_is_not_fatal() {
        let mut server = Server::new_async().await;
        server
            .mock("PROPFIND", mockito::Matcher::Any)
            .with_status(207)
            .create_async()
            .await;
        let primary = server
            .mock("PUT", "/uploads/2024/03/a.webp")
            .with_status(201)
            .create_async()
            .await;
        server
            .mock("PUT", "/uploads/2024/03/thumbnails/a.webp")
            .with_status(507)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let config = app_config(dir.path().to_path_buf(), String::new());
        let dav = BackendConfig::WebDav(WebDavConfig {
            url: server.url(),
            user: "u".into(),
            password: "p".into(),
        });
        let backend = Backend::for_bucket(&bucket(5, BucketKind::WebDav, dav), &config)
            .await
            .unwrap();

        let generated = Thumbnail::Generated {
            data: Bytes::from_static(b"thumb"),
            mime_type: "image/webp",
        };
        let stored = backend.upload(&artifact(generated), now(), true).await.unwrap();

        assert_eq!(stored.url, "/uploads/2024/03/a.webp");
        assert_eq!(stored.thumbnail_url, "");
        assert_eq!(stored.storage, "webdav");
        primary.assert_async().await;
    }

    #[tokio::test]
    async fn test_telegram_upload_records_ids_and_delete_always_succeeds() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/botT0K/sendDocument")
            .match_body(mockito::Matcher::Regex("filename=\"a.webp\"".to_string()))
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{"message_id":10,"document":{"file_id":"F-main"}}}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/botT0K/sendDocument")
            .match_body(mockito::Matcher::Regex("filename=\"thumbnail_a.webp\"".to_string()))
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{"message_id":11,"document":{"file_id":"F-thumb"}}}"#)
            .create_async()
            .await;
        let deletes = server
            .mock("POST", "/botT0K/deleteMessage")
            .with_status(400)
            .with_body(r#"{"ok":false,"description":"message to delete not found"}"#)
            .expect(2)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let config = app_config(dir.path().to_path_buf(), server.url());
        let tg = BackendConfig::Telegram(TelegramConfig {
            bot_token: "T0K".into(),
            chat_id: "-100".into(),
        });
        let backend = Backend::for_bucket(&bucket(6, BucketKind::Telegram, tg), &config)
            .await
            .unwrap();

        let generated = Thumbnail::Generated {
            data: Bytes::from_static(b"thumb"),
            mime_type: "image/webp",
        };
        let stored = backend.upload(&artifact(generated), now(), true).await.unwrap();

        let tg_ref = stored.telegram.clone().unwrap();
        assert_eq!(tg_ref.file_name, "a.webp");
        assert_eq!((tg_ref.message_id, tg_ref.file_id.as_str()), (10, "F-main"));
        assert_eq!(
            (tg_ref.thumbnail_message_id, tg_ref.thumbnail_file_id.as_str()),
            (11, "F-thumb")
        );
        assert_eq!(stored.url, "/uploads/2024/03/a.webp");
        assert_eq!(stored.storage, "telegram");

        assert!(backend.delete(&image_from(&stored), Some(&tg_ref)).await);
        deletes.assert_async().await;
    }
}
