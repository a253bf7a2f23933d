//! Bucket repository: CRUD for the buckets table plus the quota ledger updates.

use oneimg_core::models::{Bucket, NewBucket};
use oneimg_core::{AppError, BackendConfig, BucketKind};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

/// Row type for the buckets table (for FromRow).
#[derive(Debug, sqlx::FromRow)]
pub struct BucketRow {
    pub id: i32,
    pub name: String,
    pub kind: BucketKind,
    pub capacity: i64,
    pub usage: i64,
    pub config: Json<serde_json::Value>,
}

impl BucketRow {
    /// Decode the stored descriptor; a malformed config is reported, never coerced.
    pub fn to_bucket(self) -> Result<Bucket, AppError> {
        let config = BackendConfig::from_value(self.kind, &self.config.0)?;
        Ok(Bucket {
            id: self.id,
            name: self.name,
            kind: self.kind,
            capacity: self.capacity,
            usage: self.usage,
            config,
        })
    }
}

const BUCKET_COLUMNS: &str = "id, name, kind, capacity, usage, config";

#[derive(Clone)]
pub struct BucketRepository {
    pool: PgPool,
}

impl BucketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "buckets", db.record_id = id))]
    pub async fn get(&self, id: i32) -> Result<Option<Bucket>, AppError> {
        let row: Option<BucketRow> = sqlx::query_as::<Postgres, BucketRow>(&format!(
            "SELECT {} FROM buckets WHERE id = $1",
            BUCKET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(BucketRow::to_bucket).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "buckets"))]
    pub async fn list(&self) -> Result<Vec<Bucket>, AppError> {
        let rows: Vec<BucketRow> = sqlx::query_as::<Postgres, BucketRow>(&format!(
            "SELECT {} FROM buckets ORDER BY id",
            BUCKET_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(BucketRow::to_bucket).collect()
    }

    #[tracing::instrument(skip(self), fields(db.table = "buckets"))]
    pub async fn existing_ids(&self) -> Result<Vec<i32>, AppError> {
        let ids: Vec<i32> = sqlx::query_scalar("SELECT id FROM buckets ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Whether another bucket already uses `name`.
    #[tracing::instrument(skip(self), fields(db.table = "buckets"))]
    pub async fn name_taken(&self, name: &str, exclude_id: Option<i32>) -> Result<bool, AppError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM buckets WHERE name = $1 AND ($2::INT IS NULL OR id <> $2))",
        )
        .bind(name)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    #[tracing::instrument(skip(self, bucket), fields(db.table = "buckets", kind = %bucket.kind))]
    pub async fn create(&self, bucket: NewBucket) -> Result<Bucket, AppError> {
        let row: BucketRow = sqlx::query_as::<Postgres, BucketRow>(&format!(
            r#"
            INSERT INTO buckets (name, kind, capacity, usage, config)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            BUCKET_COLUMNS
        ))
        .bind(&bucket.name)
        .bind(bucket.kind)
        .bind(bucket.capacity)
        .bind(bucket.usage)
        .bind(Json(bucket.config.to_value()))
        .fetch_one(&self.pool)
        .await?;
        row.to_bucket()
    }

    /// Insert a bucket under a fixed id, or top up an existing bucket of the same kind.
    ///
    /// Returns `None` when the id is held by a bucket of a different kind.
    #[tracing::instrument(skip(self, tx, bucket), fields(db.table = "buckets", kind = %bucket.kind))]
    pub async fn upsert_fixed_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i32,
        bucket: &NewBucket,
    ) -> Result<Option<Bucket>, AppError> {
        let row: Option<BucketRow> = sqlx::query_as::<Postgres, BucketRow>(&format!(
            r#"
            INSERT INTO buckets (id, name, kind, capacity, usage, config)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
                SET usage = buckets.usage + EXCLUDED.usage, updated_at = NOW()
                WHERE buckets.kind = EXCLUDED.kind
            RETURNING {}
            "#,
            BUCKET_COLUMNS
        ))
        .bind(id)
        .bind(&bucket.name)
        .bind(bucket.kind)
        .bind(bucket.capacity)
        .bind(bucket.usage)
        .bind(Json(bucket.config.to_value()))
        .fetch_optional(&mut **tx)
        .await?;

        // Keep the serial ahead of explicitly chosen ids.
        sqlx::query(
            "SELECT setval(pg_get_serial_sequence('buckets', 'id'), GREATEST((SELECT MAX(id) FROM buckets), 1))",
        )
        .execute(&mut **tx)
        .await?;

        row.map(BucketRow::to_bucket).transpose()
    }

    #[tracing::instrument(skip(self, config), fields(db.table = "buckets", db.record_id = id))]
    pub async fn update(
        &self,
        id: i32,
        name: &str,
        capacity: i64,
        config: &BackendConfig,
    ) -> Result<Option<Bucket>, AppError> {
        let row: Option<BucketRow> = sqlx::query_as::<Postgres, BucketRow>(&format!(
            r#"
            UPDATE buckets
            SET name = $2, capacity = $3, config = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            BUCKET_COLUMNS
        ))
        .bind(id)
        .bind(name)
        .bind(capacity)
        .bind(Json(config.to_value()))
        .fetch_optional(&self.pool)
        .await?;
        row.map(BucketRow::to_bucket).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "buckets", db.record_id = id))]
    pub async fn delete(&self, id: i32) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM buckets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Conditional credit: only applies while the bucket has room, or is unmetered.
    #[tracing::instrument(skip(self), fields(db.table = "buckets", db.record_id = id))]
    pub async fn credit_usage(&self, id: i32, bytes: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE buckets
            SET usage = usage + $2
            WHERE id = $1
              AND (usage + $2 <= capacity OR kind IN ('telegram', 'default') OR capacity = 0)
            "#,
        )
        .bind(id)
        .bind(bytes)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Conditional debit: never drives usage below zero.
    #[tracing::instrument(skip(self), fields(db.table = "buckets", db.record_id = id))]
    pub async fn debit_usage(&self, id: i32, bytes: i64) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE buckets SET usage = usage - $2 WHERE id = $1 AND usage >= $2")
            .bind(id)
            .bind(bytes)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(kind: BucketKind, config: serde_json::Value) -> BucketRow {
        BucketRow {
            id: 3,
            name: "r2".to_string(),
            kind,
            capacity: 10,
            usage: 2,
            config: Json(config),
        }
    }

    #[test]
    fn test_row_decodes_typed_config() {
        let bucket = row(
            BucketKind::R2,
            json!({
                "r2_endpoint": "https://acc.r2.cloudflarestorage.com",
                "r2_access_key": "ak",
                "r2_secret_key": "sk",
                "r2_bucket": "img"
            }),
        )
        .to_bucket()
        .unwrap();

        match bucket.config {
            BackendConfig::R2(c) => assert_eq!(c.bucket, "img"),
            other => panic!("unexpected config {:?}", other),
        }
        assert_eq!((bucket.capacity, bucket.usage), (10, 2));
    }

    #[test]
    fn test_default_row_accepts_null_config() {
        let bucket = row(BucketKind::Default, serde_json::Value::Null).to_bucket().unwrap();
        assert_eq!(bucket.config, BackendConfig::Local);
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let result = row(BucketKind::Ftp, json!({"ftp_host": "h"})).to_bucket();
        assert!(matches!(result, Err(AppError::InvalidConfig(_))));
    }
}
