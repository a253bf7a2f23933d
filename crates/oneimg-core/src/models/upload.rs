use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::image::Image;

/// One file of an upload request, as received.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    /// Declared Content-Type; may be empty.
    pub content_type: String,
    pub data: Vec<u8>,
}

impl UploadFile {
    pub fn size(&self) -> i64 {
        self.data.len() as i64
    }
}

/// Identity of the user performing an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploader {
    pub user_id: i32,
    pub username: String,
    /// Visitor uuid carried by the session.
    pub uuid: String,
}

/// Identity of the user requesting a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i32,
    pub username: String,
    pub uuid: String,
    pub is_admin: bool,
}

impl Actor {
    pub fn admin(username: &str) -> Self {
        Actor {
            user_id: 1,
            username: username.to_string(),
            uuid: String::new(),
            is_admin: true,
        }
    }
}

/// Per-file result of a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    pub id: i32,
    pub url: String,
    pub thumbnail_url: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub width: i32,
    pub height: i32,
    pub storage: String,
    pub bucket_id: i32,
    pub created_at: DateTime<Utc>,
}

impl From<&Image> for UploadResult {
    fn from(image: &Image) -> Self {
        UploadResult {
            id: image.id,
            url: image.url.clone(),
            thumbnail_url: image.thumbnail.clone(),
            file_name: image.file_name.clone(),
            file_size: image.file_size,
            mime_type: image.mime_type.clone(),
            width: image.width,
            height: image.height,
            storage: image.storage.clone(),
            bucket_id: image.bucket_id.unwrap_or_default(),
            created_at: image.created_at,
        }
    }
}

/// Result of deleting one image.
///
/// The record is removed even when the backend delete fails, so the two flags
/// are reported separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub record_deleted: bool,
    pub physical_delete_succeeded: bool,
}
