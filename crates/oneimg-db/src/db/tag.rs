//! Tag repository: image ↔ tag links.

use oneimg_core::models::Tag;
use oneimg_core::AppError;
use sqlx::{PgPool, Postgres};

#[derive(Clone)]
pub struct TagRepository {
    pool: PgPool,
}

impl TagRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The subset of `ids` that name existing tags.
    #[tracing::instrument(skip(self, ids), fields(db.table = "tags", count = ids.len()))]
    pub async fn existing(&self, ids: &[i32]) -> Result<Vec<Tag>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let tags = sqlx::query_as::<Postgres, Tag>(
            "SELECT id, name FROM tags WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(tags)
    }

    #[tracing::instrument(skip(self, tag_ids), fields(db.table = "image_to_tags", db.record_id = image_id))]
    pub async fn link(&self, image_id: i32, tag_ids: &[i32]) -> Result<u64, AppError> {
        if tag_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            r#"
            INSERT INTO image_to_tags (image_id, tag_id)
            SELECT $1, UNNEST($2::INT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(image_id)
        .bind(tag_ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "image_to_tags", db.record_id = image_id))]
    pub async fn unlink_image(&self, image_id: i32) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM image_to_tags WHERE image_id = $1")
            .bind(image_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete up to `limit` tag links belonging to images of a bucket.
    #[tracing::instrument(skip(self), fields(db.table = "image_to_tags"))]
    pub async fn unlink_batch_in_bucket(&self, bucket_id: i32, limit: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM image_to_tags
            WHERE ctid IN (
                SELECT t.ctid FROM image_to_tags t
                JOIN images i ON i.id = t.image_id
                WHERE i.bucket_id = $1
                LIMIT $2
            )
            "#,
        )
        .bind(bucket_id)
        .bind(limit)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
