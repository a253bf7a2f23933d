//! One-shot assignment of legacy images to per-kind buckets.
//!
//! Images written before buckets existed only carry a storage kind string. Each kind
//! gets a bucket with a fixed id, created with placeholder credentials that an admin
//! fills in afterwards. Every kind is migrated in its own transaction and a run on
//! already migrated data writes nothing.

use oneimg_core::models::{ImageStorageInfo, NewBucket};
use oneimg_core::{AppError, BackendConfig, BucketKind, DEFAULT_BUCKET_ID};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::stores::Stores;

/// 1 TiB.
pub const MIGRATED_CAPACITY: i64 = 1_099_511_627_776;

/// Fixed id and name of the bucket each legacy kind is migrated into.
pub fn fixed_bucket(kind: BucketKind) -> (i32, &'static str) {
    match kind {
        BucketKind::Default => (DEFAULT_BUCKET_ID, "Local Storage"),
        BucketKind::S3 => (2, "S3 Object Storage"),
        BucketKind::R2 => (3, "Cloudflare R2 Storage"),
        BucketKind::Ftp => (4, "FTP Storage"),
        BucketKind::WebDav => (5, "WebDAV Storage"),
        BucketKind::Telegram => (6, "Telegram Storage"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationStatus {
    Migrated { images: usize, usage: i64 },
    /// Nothing pending for this kind.
    Skipped { already_assigned: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindOutcome {
    pub kind: BucketKind,
    pub bucket_id: i32,
    #[serde(flatten)]
    pub status: MigrationStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub outcomes: Vec<KindOutcome>,
    /// Storage strings that match no bucket kind, with their image counts.
    pub unknown_storage: BTreeMap<String, usize>,
}

impl MigrationReport {
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, MigrationStatus::Failed { .. }))
            .count()
    }
}

#[derive(Default)]
struct Partition {
    pending: Vec<ImageStorageInfo>,
    assigned: usize,
}

impl Partition {
    fn ids(&self) -> Vec<i32> {
        self.pending.iter().map(|i| i.id).collect()
    }

    fn usage(&self) -> i64 {
        self.pending.iter().map(|i| i.file_size).sum()
    }
}

pub struct BucketMigrator {
    stores: Stores,
}

impl BucketMigrator {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn run(&self) -> Result<MigrationReport, AppError> {
        let images = self.stores.images.list_storage_info().await?;
        let existing: HashSet<i32> = self.stores.buckets.bucket_ids().await?.into_iter().collect();
        tracing::info!(images = images.len(), buckets = existing.len(), "Starting bucket migration");

        let mut partitions: BTreeMap<usize, Partition> = BTreeMap::new();
        let mut report = MigrationReport::default();

        for image in images {
            let Ok(kind) = image.storage.trim().parse::<BucketKind>() else {
                *report.unknown_storage.entry(image.storage.clone()).or_default() += 1;
                continue;
            };
            let partition = partitions.entry(kind_index(kind)).or_default();
            let assigned = matches!(image.bucket_id, Some(id) if id != 0 && existing.contains(&id));
            if assigned {
                partition.assigned += 1;
            } else {
                partition.pending.push(image);
            }
        }

        for (index, kind) in BucketKind::ALL.into_iter().enumerate() {
            let partition = partitions.remove(&index).unwrap_or_default();
            let outcome = self.migrate_kind(kind, &partition).await;
            match &outcome.status {
                MigrationStatus::Failed { error } => {
                    tracing::error!(kind = %kind, error = %error, "Bucket migration failed, rolled back")
                }
                status => tracing::info!(kind = %kind, ?status, "Bucket migration step done"),
            }
            report.outcomes.push(outcome);
        }

        if !report.unknown_storage.is_empty() {
            tracing::warn!(unknown = ?report.unknown_storage, "Images with unknown storage left untouched");
        }
        Ok(report)
    }

    async fn migrate_kind(&self, kind: BucketKind, partition: &Partition) -> KindOutcome {
        let (bucket_id, name) = fixed_bucket(kind);
        let outcome = |status: MigrationStatus| KindOutcome {
            kind,
            bucket_id,
            status,
        };

        if partition.pending.is_empty() {
            return outcome(MigrationStatus::Skipped {
                already_assigned: partition.assigned,
            });
        }

        let ids = partition.ids();
        let usage = partition.usage();

        let result = if kind == BucketKind::Default {
            self.stores
                .images
                .assign_bucket(&ids, DEFAULT_BUCKET_ID)
                .await
                .map(|_| ())
        } else {
            let bucket = NewBucket {
                id: Some(bucket_id),
                name: name.to_string(),
                kind,
                capacity: MIGRATED_CAPACITY,
                usage,
                config: BackendConfig::placeholder(kind),
            };
            self.stores
                .buckets
                .assign_partition(bucket_id, bucket, &ids)
                .await
                .map(|_| ())
        };

        match result {
            Ok(()) => outcome(MigrationStatus::Migrated {
                images: ids.len(),
                usage,
            }),
            Err(e) => outcome(MigrationStatus::Failed {
                error: e.to_string(),
            }),
        }
    }
}

fn kind_index(kind: BucketKind) -> usize {
    BucketKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{s3_bucket, MemoryStore};
    use std::sync::Arc;

    fn legacy_data() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.insert_legacy_image("default", 5, None);
        store.insert_legacy_image("s3", 100, None);
        store.insert_legacy_image("s3", 50, Some(0));
        store.insert_legacy_image("ftp", 70, None);
        store.insert_legacy_image("WebDAV", 30, Some(99));
        store.insert_legacy_image("nfs", 1, None);
        store
    }

    fn status_of(report: &MigrationReport, kind: BucketKind) -> &MigrationStatus {
        &report.outcomes.iter().find(|o| o.kind == kind).unwrap().status
    }

    #[tokio::test]
    async fn test_migrates_each_kind_into_fixed_bucket() {
        let store = legacy_data();
        let report = BucketMigrator::new(store.stores()).run().await.unwrap();

        assert_eq!(
            status_of(&report, BucketKind::S3),
            &MigrationStatus::Migrated { images: 2, usage: 150 }
        );
        assert_eq!(
            status_of(&report, BucketKind::Default),
            &MigrationStatus::Migrated { images: 1, usage: 5 }
        );
        assert_eq!(
            status_of(&report, BucketKind::R2),
            &MigrationStatus::Skipped { already_assigned: 0 }
        );
        assert_eq!(report.unknown_storage.get("nfs"), Some(&1));
        assert_eq!(report.failed(), 0);

        let s3 = store.bucket(2);
        assert_eq!(s3.name, "S3 Object Storage");
        assert_eq!(s3.capacity, MIGRATED_CAPACITY);
        assert_eq!(s3.usage, 150);
        assert_eq!(s3.config, BackendConfig::placeholder(BucketKind::S3));
        assert_eq!(store.bucket(5).usage, 30);
        assert!(!store.has_bucket(3));

        for image in store.images() {
            match image.storage.as_str() {
                "nfs" => assert_eq!(image.bucket_id, None),
                "s3" => assert_eq!(image.bucket_id, Some(2)),
                "ftp" => assert_eq!(image.bucket_id, Some(4)),
                "WebDAV" => assert_eq!(image.bucket_id, Some(5)),
                _ => assert_eq!(image.bucket_id, Some(DEFAULT_BUCKET_ID)),
            }
        }
    }

    #[tokio::test]
    async fn test_second_run_writes_nothing() {
        let store = legacy_data();
        let migrator = BucketMigrator::new(store.stores());
        migrator.run().await.unwrap();

        let writes = store.write_count();
        let buckets = store.bucket_count();
        let report = migrator.run().await.unwrap();

        assert_eq!(store.write_count(), writes);
        assert_eq!(store.bucket_count(), buckets);
        assert_eq!(
            status_of(&report, BucketKind::S3),
            &MigrationStatus::Skipped { already_assigned: 2 }
        );
    }

    #[tokio::test]
    async fn test_failed_kind_rolls_back_and_others_continue() {
        let store = legacy_data();
        store.fail_partition(BucketKind::Ftp);

        let report = BucketMigrator::new(store.stores()).run().await.unwrap();

        assert!(matches!(status_of(&report, BucketKind::Ftp), MigrationStatus::Failed { .. }));
        assert_eq!(report.failed(), 1);
        assert!(!store.has_bucket(4));
        assert!(store.has_bucket(2));
        let ftp = store.images().into_iter().find(|i| i.storage == "ftp").unwrap();
        assert_eq!(ftp.bucket_id, None);
    }

    #[tokio::test]
    async fn test_existing_bucket_of_same_kind_is_topped_up() {
        let store = MemoryStore::new();
        store.insert_bucket(s3_bucket(2, 1_000, 400));
        store.insert_legacy_image("s3", 100, None);

        BucketMigrator::new(store.stores()).run().await.unwrap();

        let bucket = store.bucket(2);
        assert_eq!(bucket.usage, 500);
        assert_eq!(bucket.capacity, 1_000);
    }

    #[tokio::test]
    async fn test_fixed_id_taken_by_other_kind_fails() {
        let store = MemoryStore::new();
        let mut taken = s3_bucket(4, 1_000, 0);
        taken.name = "someone else's".to_string();
        store.insert_bucket(taken);
        store.insert_legacy_image("ftp", 10, None);

        let report = BucketMigrator::new(store.stores()).run().await.unwrap();
        assert!(matches!(status_of(&report, BucketKind::Ftp), MigrationStatus::Failed { .. }));
        assert_eq!(store.bucket(4).kind, BucketKind::S3);
    }

    #[test]
    fn test_report_serializes_flat_status() {
        let report = MigrationReport {
            outcomes: vec![KindOutcome {
                kind: BucketKind::R2,
                bucket_id: 3,
                status: MigrationStatus::Migrated { images: 4, usage: 10 },
            }],
            unknown_storage: BTreeMap::new(),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value["outcomes"][0],
            serde_json::json!({ "kind": "r2", "bucket_id": 3, "status": "migrated", "images": 4, "usage": 10 })
        );
    }
}
