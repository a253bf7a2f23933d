//! Image repository: image records and their bucket assignment.

use oneimg_core::models::{Image, ImageStorageInfo, NewImage};
use oneimg_core::AppError;
use sqlx::{PgPool, Postgres, Transaction};

const IMAGE_COLUMNS: &str = "id, url, thumbnail, file_name, file_size, mime_type, width, height, \
     storage, bucket_id, user_id, md5, uuid, created_at";

#[derive(Clone)]
pub struct ImageRepository {
    pool: PgPool,
}

impl ImageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "images", db.record_id = id))]
    pub async fn get(&self, id: i32) -> Result<Option<Image>, AppError> {
        let image = sqlx::query_as::<Postgres, Image>(&format!(
            "SELECT {} FROM images WHERE id = $1",
            IMAGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(image)
    }

    #[tracing::instrument(skip(self, image), fields(db.table = "images", file_name = %image.file_name))]
    pub async fn create(&self, image: NewImage) -> Result<Image, AppError> {
        let created = sqlx::query_as::<Postgres, Image>(&format!(
            r#"
            INSERT INTO images (url, thumbnail, file_name, file_size, mime_type, width, height,
                                storage, bucket_id, user_id, md5, uuid)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            IMAGE_COLUMNS
        ))
        .bind(&image.url)
        .bind(&image.thumbnail)
        .bind(&image.file_name)
        .bind(image.file_size)
        .bind(&image.mime_type)
        .bind(image.width)
        .bind(image.height)
        .bind(&image.storage)
        .bind(image.bucket_id)
        .bind(image.user_id)
        .bind(&image.md5)
        .bind(&image.uuid)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    #[tracing::instrument(skip(self), fields(db.table = "images", db.record_id = id))]
    pub async fn delete(&self, id: i32) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Every image's legacy storage tag, size and bucket assignment.
    #[tracing::instrument(skip(self), fields(db.table = "images"))]
    pub async fn list_storage_info(&self) -> Result<Vec<ImageStorageInfo>, AppError> {
        let rows = sqlx::query_as::<Postgres, ImageStorageInfo>(
            "SELECT id, storage, file_size, bucket_id FROM images ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[tracing::instrument(skip(self, ids), fields(db.table = "images", count = ids.len()))]
    pub async fn assign_bucket(&self, ids: &[i32], bucket_id: i32) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("UPDATE images SET bucket_id = $2 WHERE id = ANY($1)")
            .bind(ids)
            .bind(bucket_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self, tx, ids), fields(db.table = "images", count = ids.len()))]
    pub async fn assign_bucket_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ids: &[i32],
        bucket_id: i32,
    ) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("UPDATE images SET bucket_id = $2 WHERE id = ANY($1)")
            .bind(ids)
            .bind(bucket_id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete up to `limit` images of a bucket.
    #[tracing::instrument(skip(self), fields(db.table = "images"))]
    pub async fn delete_batch_in_bucket(&self, bucket_id: i32, limit: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM images
            WHERE id IN (SELECT id FROM images WHERE bucket_id = $1 LIMIT $2)
            "#,
        )
        .bind(bucket_id)
        .bind(limit)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
