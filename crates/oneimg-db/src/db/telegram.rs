//! Telegram object refs, keyed by stored file name.

use oneimg_core::models::TelegramObjectRef;
use oneimg_core::AppError;
use sqlx::{PgPool, Postgres};

#[derive(Clone)]
pub struct TelegramRefRepository {
    pool: PgPool,
}

impl TelegramRefRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, object_ref), fields(db.table = "image_telegram", file_name = %object_ref.file_name))]
    pub async fn create(&self, object_ref: &TelegramObjectRef) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO image_telegram (file_name, file_id, thumbnail_file_id, message_id, thumbnail_message_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (file_name) DO UPDATE
                SET file_id = EXCLUDED.file_id,
                    thumbnail_file_id = EXCLUDED.thumbnail_file_id,
                    message_id = EXCLUDED.message_id,
                    thumbnail_message_id = EXCLUDED.thumbnail_message_id
            "#,
        )
        .bind(&object_ref.file_name)
        .bind(&object_ref.file_id)
        .bind(&object_ref.thumbnail_file_id)
        .bind(object_ref.message_id)
        .bind(object_ref.thumbnail_message_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "image_telegram"))]
    pub async fn get_by_file_name(&self, file_name: &str) -> Result<Option<TelegramObjectRef>, AppError> {
        let row = sqlx::query_as::<Postgres, TelegramObjectRef>(
            r#"
            SELECT file_name, file_id, thumbnail_file_id, message_id, thumbnail_message_id
            FROM image_telegram
            WHERE file_name = $1
            "#,
        )
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    #[tracing::instrument(skip(self), fields(db.table = "image_telegram"))]
    pub async fn delete_by_file_name(&self, file_name: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM image_telegram WHERE file_name = $1")
            .bind(file_name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
