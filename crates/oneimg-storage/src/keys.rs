//! Shared key layout for storage backends.
//!
//! Primary objects live at `uploads/{YYYY}/{MM}/{name}` and thumbnails at
//! `uploads/{YYYY}/{MM}/thumbnails/{name}`. Public URLs are the key with a leading `/`.

use chrono::{DateTime, Datelike, Utc};

pub const UPLOADS_PREFIX: &str = "uploads";
pub const THUMBNAILS_DIR: &str = "thumbnails";

/// `uploads/YYYY/MM` for the given instant.
pub fn date_prefix(now: DateTime<Utc>) -> String {
    format!("{}/{:04}/{:02}", UPLOADS_PREFIX, now.year(), now.month())
}

pub fn primary_key(now: DateTime<Utc>, file_name: &str) -> String {
    format!("{}/{}", date_prefix(now), file_name)
}

pub fn thumbnail_key(now: DateTime<Utc>, file_name: &str) -> String {
    format!("{}/{}/{}", date_prefix(now), THUMBNAILS_DIR, file_name)
}

pub fn public_url(key: &str) -> String {
    format!("/{}", key.trim_start_matches('/'))
}

/// Storage key behind a public URL. Empty URLs have no key.
pub fn key_from_url(url: &str) -> Option<String> {
    let key = url.trim().trim_start_matches('/');
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

/// Key relative to the uploads root, as used on local disk.
pub fn relative_to_uploads(key: &str) -> &str {
    let key = key.trim_start_matches('/');
    key.strip_prefix(UPLOADS_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(key)
}

/// Directory part of a key, without a trailing slash.
pub fn parent_dir(key: &str) -> Option<&str> {
    key.trim_start_matches('/').rsplit_once('/').map(|(dir, _)| dir)
}
