//! Database repositories for the data access layer
//!
//! One repository per table, each owning a `PgPool` clone. Multi-table writes go
//! through [`transaction::TransactionGuard`].

pub mod bucket;
pub mod image;
pub mod migration;
pub mod pool;
pub mod settings;
pub mod tag;
pub mod telegram;
pub mod transaction;

pub use bucket::{BucketRepository, BucketRow};
pub use image::ImageRepository;
pub use migration::MigrationRepository;
pub use settings::SettingsRepository;
pub use tag::TagRepository;
pub use telegram::TelegramRefRepository;
