//! OneIMG Core Library
//!
//! Domain models, the bucket config adapter, error types and process configuration
//! shared by every OneIMG crate.

pub mod bucket_config;
pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use bucket_config::{
    capacity_from_gb, BackendConfig, ConfigError, ConfigMap, FtpConfig, S3Config,
    TelegramConfig, WebDavConfig,
};
pub use config::AppConfig;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use storage_types::{BucketKind, DEFAULT_BUCKET_ID};
