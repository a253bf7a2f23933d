use oneimg_db::{BucketStore, ImageStore, PgStores, SettingsStore, TagStore, TelegramRefStore};
use std::sync::Arc;

/// The store handles every service is built from.
#[derive(Clone)]
pub struct Stores {
    pub buckets: Arc<dyn BucketStore>,
    pub images: Arc<dyn ImageStore>,
    pub tags: Arc<dyn TagStore>,
    pub telegram: Arc<dyn TelegramRefStore>,
    pub settings: Arc<dyn SettingsStore>,
}

impl Stores {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let pg = Arc::new(PgStores::new(pool));
        Stores {
            buckets: pg.clone(),
            images: pg.clone(),
            tags: pg.clone(),
            telegram: pg.clone(),
            settings: pg,
        }
    }
}
