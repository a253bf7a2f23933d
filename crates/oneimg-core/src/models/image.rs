use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted image record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Image {
    pub id: i32,
    pub url: String,
    /// Empty when no thumbnail was stored.
    pub thumbnail: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub width: i32,
    pub height: i32,
    /// Kind tag copied from the owning bucket.
    pub storage: String,
    pub bucket_id: Option<i32>,
    pub user_id: i32,
    /// Hex md5 of `username + file_name`.
    pub md5: String,
    /// Visitor uuid of the uploader.
    pub uuid: String,
    pub created_at: DateTime<Utc>,
}

impl Image {
    pub fn has_thumbnail(&self) -> bool {
        !self.thumbnail.is_empty()
    }
}

/// Image record about to be inserted.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub url: String,
    pub thumbnail: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub width: i32,
    pub height: i32,
    pub storage: String,
    pub bucket_id: i32,
    pub user_id: i32,
    pub md5: String,
    pub uuid: String,
}

/// Minimal projection used by the bucket migrator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ImageStorageInfo {
    pub id: i32,
    pub storage: String,
    pub file_size: i64,
    pub bucket_id: Option<i32>,
}

/// Fingerprint binding an image to the user that uploaded it.
pub fn upload_fingerprint(username: &str, file_name: &str) -> String {
    format!("{:x}", md5::compute(format!("{}{}", username, file_name)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Tag {
    pub id: i32,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_hex_md5_of_concatenation() {
        // md5("adminphoto.webp")
        let expected = format!("{:x}", md5::compute(b"adminphoto.webp"));
        assert_eq!(upload_fingerprint("admin", "photo.webp"), expected);
        assert_eq!(expected.len(), 32);
        assert_ne!(
            upload_fingerprint("admin", "photo.webp"),
            upload_fingerprint("guest", "photo.webp")
        );
    }
}
