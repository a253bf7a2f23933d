//! The single settings row.

use oneimg_core::models::Settings;
use oneimg_core::{AppError, DEFAULT_BUCKET_ID};
use sqlx::{PgPool, Postgres};

#[derive(Clone)]
pub struct SettingsRepository {
    pool: PgPool,
}

impl SettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Current settings; defaults when the row is missing.
    #[tracing::instrument(skip(self), fields(db.table = "settings"))]
    pub async fn get(&self) -> Result<Settings, AppError> {
        let settings = sqlx::query_as::<Postgres, Settings>(
            r#"
            SELECT original_image, save_webp, thumbnail, tg_notice, tg_bot_token, tg_receivers,
                   tg_notice_text, save_original_name, default_storage, watermark_enable,
                   watermark_text, watermark_pos, watermark_size, watermark_color, watermark_opac
            FROM settings
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings.unwrap_or_else(|| {
            tracing::warn!("Settings row missing, using defaults");
            Settings::default()
        }))
    }

    /// Point uploads back at the default bucket if `bucket_id` was the default target.
    #[tracing::instrument(skip(self), fields(db.table = "settings"))]
    pub async fn reset_default_storage_if(&self, bucket_id: i32) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE settings SET default_storage = $1, updated_at = NOW() WHERE id = 1 AND default_storage = $2",
        )
        .bind(DEFAULT_BUCKET_ID)
        .bind(bucket_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
