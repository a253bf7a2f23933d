//! Per-bucket capacity ledger.
//!
//! Admission is checked against a bucket snapshot before any write; the credit and
//! debit that follow are single conditional UPDATEs, so concurrent uploads can only
//! lose a credit, never push usage past capacity or below zero.

use oneimg_core::models::Bucket;
use oneimg_core::{AppError, DEFAULT_BUCKET_ID};
use oneimg_db::BucketStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct QuotaLedger {
    buckets: Arc<dyn BucketStore>,
}

impl QuotaLedger {
    pub fn new(buckets: Arc<dyn BucketStore>) -> Self {
        Self { buckets }
    }

    /// Reject `incoming` bytes that would take a metered bucket past its capacity.
    pub fn admit(&self, bucket: &Bucket, incoming: i64) -> Result<(), AppError> {
        if bucket.has_room_for(incoming) {
            return Ok(());
        }
        tracing::info!(
            bucket_id = bucket.id,
            usage = bucket.usage,
            incoming,
            capacity = bucket.capacity,
            "Upload rejected, bucket capacity exceeded"
        );
        Err(AppError::CapacityExceeded {
            bucket_id: bucket.id,
            usage: bucket.usage,
            incoming,
            capacity: bucket.capacity,
        })
    }

    /// Returns whether the credit was applied. Failures are logged only.
    pub async fn credit(&self, bucket_id: i32, bytes: i64) -> bool {
        match self.buckets.credit_usage(bucket_id, bytes).await {
            Ok(0) => {
                tracing::warn!(bucket_id, bytes, "Usage credit matched no rows");
                false
            }
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(bucket_id, bytes, error = %e, "Usage credit failed");
                false
            }
        }
    }

    /// Returns whether the debit was applied. The default bucket is never debited.
    pub async fn debit(&self, bucket_id: i32, bytes: i64) -> bool {
        if bucket_id == DEFAULT_BUCKET_ID {
            return false;
        }
        match self.buckets.debit_usage(bucket_id, bytes).await {
            Ok(0) => {
                tracing::warn!(bucket_id, bytes, "Usage debit matched no rows");
                false
            }
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(bucket_id, bytes, error = %e, "Usage debit failed");
                false
            }
        }
    }
}
