//! OneIMG services layer
//!
//! Orchestrates the upload and delete pipelines, bucket administration and the
//! legacy bucket migration over the store traits in `oneimg-db` and the backends
//! in `oneimg-storage`.

pub mod buckets;
pub mod delete;
pub mod migration;
pub mod notify;
pub mod quota;
pub mod stores;
pub mod upload;

#[cfg(test)]
mod testing;

use oneimg_core::AppConfig;
use std::sync::Arc;

pub use buckets::{BucketAdminService, BucketPurge};
pub use delete::DeleteService;
pub use migration::{BucketMigrator, KindOutcome, MigrationReport, MigrationStatus};
pub use notify::{render_notice, NoticeContext, Notifier};
pub use quota::QuotaLedger;
pub use stores::Stores;
pub use upload::UploadService;

/// Every service, built once and shared.
#[derive(Clone)]
pub struct AppServices {
    pub config: Arc<AppConfig>,
    pub stores: Stores,
    pub uploads: UploadService,
    pub deletes: DeleteService,
    pub buckets: BucketAdminService,
}

impl AppServices {
    pub fn new(config: AppConfig, pool: sqlx::PgPool) -> Self {
        Self::from_stores(Arc::new(config), Stores::postgres(pool))
    }

    pub fn from_stores(config: Arc<AppConfig>, stores: Stores) -> Self {
        AppServices {
            uploads: UploadService::new(config.clone(), stores.clone()),
            deletes: DeleteService::new(config.clone(), stores.clone()),
            buckets: BucketAdminService::new(stores.clone()),
            config,
            stores,
        }
    }

    pub fn migrator(&self) -> BucketMigrator {
        BucketMigrator::new(self.stores.clone())
    }
}
