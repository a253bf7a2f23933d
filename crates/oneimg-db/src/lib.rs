//! OneIMG Database Layer
//!
//! sqlx/Postgres repositories for buckets, images, tags, Telegram refs and settings,
//! plus the store traits the services are written against.

pub mod db;
pub mod store;

pub use db::pool::setup_database;
pub use db::transaction::TransactionGuard;
pub use db::{
    BucketRepository, BucketRow, ImageRepository, MigrationRepository, SettingsRepository,
    TagRepository, TelegramRefRepository,
};
pub use store::{BucketStore, ImageStore, PgStores, SettingsStore, TagStore, TelegramRefStore};
