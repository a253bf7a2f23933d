use serde::{Deserialize, Serialize};

use crate::bucket_config::BackendConfig;
use crate::storage_types::{BucketKind, DEFAULT_BUCKET_ID};

/// A named storage target with its own quota.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub id: i32,
    pub name: String,
    pub kind: BucketKind,
    /// Bytes; 0 means unlimited.
    pub capacity: i64,
    /// Bytes currently attributed to member images.
    pub usage: i64,
    pub config: BackendConfig,
}

impl Bucket {
    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_BUCKET_ID
    }

    /// Whether uploads into this bucket skip the capacity check.
    pub fn is_unmetered(&self) -> bool {
        self.kind.is_unmetered() || self.capacity == 0
    }

    /// Whether `incoming` more bytes fit. Exact fill is allowed.
    pub fn has_room_for(&self, incoming: i64) -> bool {
        self.is_unmetered() || self.usage.saturating_add(incoming) <= self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.usage >= self.capacity
    }
}

/// Bucket row about to be inserted. `id` is set only for the fixed migration ids.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBucket {
    pub id: Option<i32>,
    pub name: String,
    pub kind: BucketKind,
    pub capacity: i64,
    pub usage: i64,
    pub config: BackendConfig,
}

impl NewBucket {
    pub fn into_bucket(self, id: i32) -> Bucket {
        Bucket {
            id,
            name: self.name,
            kind: self.kind,
            capacity: self.capacity,
            usage: self.usage,
            config: self.config,
        }
    }
}

/// Admin request to create a bucket. Capacity is entered in GB.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBucketRequest {
    pub name: String,
    pub kind: BucketKind,
    pub capacity_gb: String,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

/// Admin request to edit a bucket. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBucketRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub capacity_gb: Option<String>,
    #[serde(default)]
    pub config: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Bucket as listed to uploaders: no credentials.
#[derive(Debug, Clone, Serialize)]
pub struct BucketSummary {
    pub id: i32,
    pub name: String,
    pub kind: BucketKind,
    pub capacity: i64,
    pub usage: i64,
}

impl From<&Bucket> for BucketSummary {
    fn from(bucket: &Bucket) -> Self {
        BucketSummary {
            id: bucket.id,
            name: bucket.name.clone(),
            kind: bucket.kind,
            capacity: bucket.capacity,
            usage: bucket.usage,
        }
    }
}
