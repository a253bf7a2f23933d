//! In-memory store fakes for service tests.

use async_trait::async_trait;
use chrono::Utc;
use oneimg_core::models::{
    Bucket, Image, ImageStorageInfo, NewBucket, NewImage, Settings, Tag, TelegramObjectRef,
    UploadFile, Uploader,
};
use oneimg_core::{AppConfig, AppError, BackendConfig, BucketKind, S3Config, DEFAULT_BUCKET_ID};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use oneimg_db::{BucketStore, ImageStore, SettingsStore, TagStore, TelegramRefStore};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::stores::Stores;

#[derive(Default)]
struct State {
    buckets: BTreeMap<i32, Bucket>,
    images: BTreeMap<i32, Image>,
    tags: BTreeMap<i32, Tag>,
    links: HashSet<(i32, i32)>,
    refs: HashMap<String, TelegramObjectRef>,
    settings: Settings,
    next_bucket_id: i32,
    next_image_id: i32,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    writes: AtomicUsize,
    /// Kinds whose migration partition fails mid-transaction.
    failing_partitions: Mutex<HashSet<BucketKind>>,
    /// Ids for which image and tag batch deletes stall.
    stalled_buckets: Mutex<HashSet<i32>>,
    failing_refs: AtomicBool,
}

pub fn app_config(uploads_dir: &Path, telegram_api_base: &str) -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/oneimg".to_string(),
        db_max_connections: 1,
        db_timeout_seconds: 1,
        max_file_size: 4 * 1024 * 1024,
        allowed_types: ["image/jpeg", "image/png", "image/gif", "image/webp", "image/svg+xml"]
            .iter()
            .map(|t| t.to_string())
            .collect(),
        uploads_dir: uploads_dir.to_path_buf(),
        watermark_font_path: uploads_dir.join("no-such-font.ttf"),
        telegram_api_base: telegram_api_base.to_string(),
    }
}

pub fn uploader() -> Uploader {
    Uploader {
        user_id: 1,
        username: "admin".to_string(),
        uuid: "visitor-1".to_string(),
    }
}

pub fn encoded_upload(name: &str, width: u32, height: u32, format: ImageFormat) -> UploadFile {
    let img = RgbaImage::from_pixel(width, height, Rgba([200, 40, 90, 255]));
    let mut data = Vec::new();
    DynamicImage::ImageRgba8(img)
        .to_rgb8()
        .write_to(&mut Cursor::new(&mut data), format)
        .unwrap();
    UploadFile {
        file_name: name.to_string(),
        content_type: format.to_mime_type().to_string(),
        data,
    }
}

pub fn local_bucket() -> Bucket {
    Bucket {
        id: DEFAULT_BUCKET_ID,
        name: "Local Storage".to_string(),
        kind: BucketKind::Default,
        capacity: 0,
        usage: 0,
        config: BackendConfig::Local,
    }
}

pub fn s3_bucket(id: i32, capacity: i64, usage: i64) -> Bucket {
    Bucket {
        id,
        name: format!("s3-{}", id),
        kind: BucketKind::S3,
        capacity,
        usage,
        config: BackendConfig::S3(S3Config {
            endpoint: "http://127.0.0.1:1".to_string(),
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            bucket: "images".to_string(),
        }),
    }
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        let store = MemoryStore::default();
        {
            let mut state = store.state.lock().unwrap();
            state.buckets.insert(DEFAULT_BUCKET_ID, local_bucket());
            state.next_bucket_id = 100;
            state.next_image_id = 1;
        }
        Arc::new(store)
    }

    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores {
            buckets: self.clone(),
            images: self.clone(),
            tags: self.clone(),
            telegram: self.clone(),
            settings: self.clone(),
        }
    }

    fn touch(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn insert_bucket(&self, bucket: Bucket) {
        self.state.lock().unwrap().buckets.insert(bucket.id, bucket);
    }

    pub fn create_bucket_sync(&self, bucket: NewBucket) -> Bucket {
        let mut state = self.state.lock().unwrap();
        let id = bucket.id.unwrap_or_else(|| {
            state.next_bucket_id += 1;
            state.next_bucket_id
        });
        let bucket = bucket.into_bucket(id);
        state.buckets.insert(id, bucket.clone());
        bucket
    }

    pub fn bucket(&self, id: i32) -> Bucket {
        self.state.lock().unwrap().buckets[&id].clone()
    }

    pub fn has_bucket(&self, id: i32) -> bool {
        self.state.lock().unwrap().buckets.contains_key(&id)
    }

    pub fn bucket_count(&self) -> usize {
        self.state.lock().unwrap().buckets.len()
    }

    /// Insert a legacy image row directly.
    pub fn insert_legacy_image(&self, storage: &str, file_size: i64, bucket_id: Option<i32>) -> i32 {
        let mut state = self.state.lock().unwrap();
        let id = state.next_image_id;
        state.next_image_id += 1;
        state.images.insert(
            id,
            Image {
                id,
                url: format!("/uploads/2023/01/legacy-{}.png", id),
                thumbnail: String::new(),
                file_name: format!("legacy-{}.png", id),
                file_size,
                mime_type: "image/png".to_string(),
                width: 1,
                height: 1,
                storage: storage.to_string(),
                bucket_id,
                user_id: 1,
                md5: String::new(),
                uuid: String::new(),
                created_at: Utc::now(),
            },
        );
        id
    }

    pub fn image(&self, id: i32) -> Option<Image> {
        self.state.lock().unwrap().images.get(&id).cloned()
    }

    pub fn images(&self) -> Vec<Image> {
        self.state.lock().unwrap().images.values().cloned().collect()
    }

    pub fn add_tag(&self, id: i32, name: &str) {
        self.state.lock().unwrap().tags.insert(
            id,
            Tag {
                id,
                name: name.to_string(),
            },
        );
    }

    pub fn links_of(&self, image_id: i32) -> Vec<i32> {
        let mut tags: Vec<i32> = self
            .state
            .lock()
            .unwrap()
            .links
            .iter()
            .filter(|(i, _)| *i == image_id)
            .map(|(_, t)| *t)
            .collect();
        tags.sort();
        tags
    }

    pub fn link_count(&self) -> usize {
        self.state.lock().unwrap().links.len()
    }

    pub fn telegram_ref(&self, file_name: &str) -> Option<TelegramObjectRef> {
        self.state.lock().unwrap().refs.get(file_name).cloned()
    }

    pub fn set_settings(&self, settings: Settings) {
        self.state.lock().unwrap().settings = settings;
    }

    pub fn settings(&self) -> Settings {
        self.state.lock().unwrap().settings.clone()
    }

    pub fn fail_partition(&self, kind: BucketKind) {
        self.failing_partitions.lock().unwrap().insert(kind);
    }

    /// Make every `save_ref` fail.
    pub fn fail_telegram_refs(&self) {
        self.failing_refs.store(true, Ordering::SeqCst);
    }

    pub fn stall_bucket(&self, id: i32) {
        self.stalled_buckets.lock().unwrap().insert(id);
    }

    fn is_stalled(&self, id: i32) -> bool {
        self.stalled_buckets.lock().unwrap().contains(&id)
    }
}

#[async_trait]
impl BucketStore for MemoryStore {
    async fn get_bucket(&self, id: i32) -> Result<Option<Bucket>, AppError> {
        Ok(self.state.lock().unwrap().buckets.get(&id).cloned())
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>, AppError> {
        Ok(self.state.lock().unwrap().buckets.values().cloned().collect())
    }

    async fn bucket_ids(&self) -> Result<Vec<i32>, AppError> {
        Ok(self.state.lock().unwrap().buckets.keys().copied().collect())
    }

    async fn name_taken(&self, name: &str, exclude_id: Option<i32>) -> Result<bool, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .buckets
            .values()
            .any(|b| b.name == name && Some(b.id) != exclude_id))
    }

    async fn create_bucket(&self, bucket: NewBucket) -> Result<Bucket, AppError> {
        self.touch();
        Ok(self.create_bucket_sync(bucket))
    }

    async fn update_bucket(
        &self,
        id: i32,
        name: &str,
        capacity: i64,
        config: &BackendConfig,
    ) -> Result<Option<Bucket>, AppError> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        Ok(state.buckets.get_mut(&id).map(|b| {
            b.name = name.to_string();
            b.capacity = capacity;
            b.config = config.clone();
            b.clone()
        }))
    }

    async fn delete_bucket(&self, id: i32) -> Result<bool, AppError> {
        self.touch();
        Ok(self.state.lock().unwrap().buckets.remove(&id).is_some())
    }

    async fn credit_usage(&self, id: i32, bytes: i64) -> Result<u64, AppError> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        match state.buckets.get_mut(&id) {
            Some(b)
                if b.usage + bytes <= b.capacity
                    || matches!(b.kind, BucketKind::Telegram | BucketKind::Default)
                    || b.capacity == 0 =>
            {
                b.usage += bytes;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn debit_usage(&self, id: i32, bytes: i64) -> Result<u64, AppError> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        match state.buckets.get_mut(&id) {
            Some(b) if b.usage >= bytes => {
                b.usage -= bytes;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn assign_partition(
        &self,
        id: i32,
        bucket: NewBucket,
        image_ids: &[i32],
    ) -> Result<Bucket, AppError> {
        self.touch();
        if self.failing_partitions.lock().unwrap().contains(&bucket.kind) {
            return Err(AppError::Internal("simulated transaction failure".to_string()));
        }

        let mut state = self.state.lock().unwrap();
        let created = match state.buckets.get_mut(&id) {
            Some(existing) if existing.kind == bucket.kind => {
                existing.usage += bucket.usage;
                existing.clone()
            }
            Some(_) => {
                return Err(AppError::Conflict(format!("bucket id {} taken", id)));
            }
            None => {
                let created = bucket.into_bucket(id);
                state.buckets.insert(id, created.clone());
                created
            }
        };
        for image_id in image_ids {
            if let Some(image) = state.images.get_mut(image_id) {
                image.bucket_id = Some(id);
            }
        }
        Ok(created)
    }
}

#[async_trait]
impl ImageStore for MemoryStore {
    async fn get_image(&self, id: i32) -> Result<Option<Image>, AppError> {
        Ok(self.image(id))
    }

    async fn create_image(&self, image: NewImage) -> Result<Image, AppError> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        let id = state.next_image_id;
        state.next_image_id += 1;
        let created = Image {
            id,
            url: image.url,
            thumbnail: image.thumbnail,
            file_name: image.file_name,
            file_size: image.file_size,
            mime_type: image.mime_type,
            width: image.width,
            height: image.height,
            storage: image.storage,
            bucket_id: Some(image.bucket_id),
            user_id: image.user_id,
            md5: image.md5,
            uuid: image.uuid,
            created_at: Utc::now(),
        };
        state.images.insert(id, created.clone());
        Ok(created)
    }

    async fn delete_image(&self, id: i32) -> Result<bool, AppError> {
        self.touch();
        Ok(self.state.lock().unwrap().images.remove(&id).is_some())
    }

    async fn list_storage_info(&self) -> Result<Vec<ImageStorageInfo>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .images
            .values()
            .map(|i| ImageStorageInfo {
                id: i.id,
                storage: i.storage.clone(),
                file_size: i.file_size,
                bucket_id: i.bucket_id,
            })
            .collect())
    }

    async fn assign_bucket(&self, ids: &[i32], bucket_id: i32) -> Result<u64, AppError> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        let mut updated = 0;
        for id in ids {
            if let Some(image) = state.images.get_mut(id) {
                image.bucket_id = Some(bucket_id);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_images_in_bucket(&self, bucket_id: i32, limit: i64) -> Result<u64, AppError> {
        if self.is_stalled(bucket_id) {
            std::future::pending::<()>().await;
        }
        self.touch();
        let mut state = self.state.lock().unwrap();
        let ids: Vec<i32> = state
            .images
            .values()
            .filter(|i| i.bucket_id == Some(bucket_id))
            .map(|i| i.id)
            .take(limit as usize)
            .collect();
        for id in &ids {
            state.images.remove(id);
        }
        Ok(ids.len() as u64)
    }
}

#[async_trait]
impl TagStore for MemoryStore {
    async fn existing_tags(&self, ids: &[i32]) -> Result<Vec<Tag>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(ids.iter().filter_map(|id| state.tags.get(id).cloned()).collect())
    }

    async fn link_tags(&self, image_id: i32, tag_ids: &[i32]) -> Result<u64, AppError> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        let mut inserted = 0;
        for tag in tag_ids {
            if state.links.insert((image_id, *tag)) {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn unlink_image(&self, image_id: i32) -> Result<u64, AppError> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        let before = state.links.len();
        state.links.retain(|(i, _)| *i != image_id);
        Ok((before - state.links.len()) as u64)
    }

    async fn unlink_in_bucket(&self, bucket_id: i32, limit: i64) -> Result<u64, AppError> {
        if self.is_stalled(bucket_id) {
            std::future::pending::<()>().await;
        }
        self.touch();
        let mut state = self.state.lock().unwrap();
        let members: HashSet<i32> = state
            .images
            .values()
            .filter(|i| i.bucket_id == Some(bucket_id))
            .map(|i| i.id)
            .collect();
        let doomed: Vec<(i32, i32)> = state
            .links
            .iter()
            .filter(|(i, _)| members.contains(i))
            .take(limit as usize)
            .copied()
            .collect();
        for link in &doomed {
            state.links.remove(link);
        }
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl TelegramRefStore for MemoryStore {
    async fn save_ref(&self, object_ref: &TelegramObjectRef) -> Result<(), AppError> {
        if self.failing_refs.load(Ordering::SeqCst) {
            return Err(AppError::Internal("simulated ref insert failure".to_string()));
        }
        self.touch();
        self.state
            .lock()
            .unwrap()
            .refs
            .insert(object_ref.file_name.clone(), object_ref.clone());
        Ok(())
    }

    async fn get_ref(&self, file_name: &str) -> Result<Option<TelegramObjectRef>, AppError> {
        Ok(self.telegram_ref(file_name))
    }

    async fn delete_ref(&self, file_name: &str) -> Result<bool, AppError> {
        self.touch();
        Ok(self.state.lock().unwrap().refs.remove(file_name).is_some())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_settings(&self) -> Result<Settings, AppError> {
        Ok(self.settings())
    }

    async fn reset_default_storage_if(&self, bucket_id: i32) -> Result<bool, AppError> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        if state.settings.default_storage == bucket_id {
            state.settings.default_storage = DEFAULT_BUCKET_ID;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
