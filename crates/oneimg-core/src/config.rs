//! Configuration module
//!
//! Process-wide settings read from the environment (and `.env` through dotenvy).
//! Per-bucket credentials and admin-editable settings live in the database instead.

use std::env;
use std::path::PathBuf;

const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
const ALLOWED_TYPES: &str = "image/jpeg,image/png,image/gif,image/webp";
const UPLOADS_DIR: &str = "./uploads";
const WATERMARK_FONT_PATH: &str = "./assets/fonts/watermark.ttf";
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    /// Upper bound on a single uploaded file, in bytes.
    pub max_file_size: usize,
    /// Lower-cased MIME allow-list.
    pub allowed_types: Vec<String>,
    /// Root directory of the local default bucket.
    pub uploads_dir: PathBuf,
    pub watermark_font_path: PathBuf,
    pub telegram_api_base: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_source(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` passes the process environment.
    pub fn from_source<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = AppConfig {
            database_url: lookup("DATABASE_URL")
                .filter(|s| !s.is_empty())
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: var("DB_MAX_CONNECTIONS", &MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: var("DB_TIMEOUT_SECONDS", &CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            max_file_size: var("MAX_FILE_SIZE", &MAX_FILE_SIZE.to_string())
                .parse()
                .unwrap_or(MAX_FILE_SIZE),
            allowed_types: var("ALLOWED_TYPES", ALLOWED_TYPES)
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            uploads_dir: PathBuf::from(var("UPLOADS_DIR", UPLOADS_DIR)),
            watermark_font_path: PathBuf::from(var("WATERMARK_FONT_PATH", WATERMARK_FONT_PATH)),
            telegram_api_base: var("TELEGRAM_API_BASE", TELEGRAM_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgres://")
            && !self.database_url.starts_with("postgresql://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.max_file_size == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE must be greater than 0"));
        }

        if self.allowed_types.is_empty() {
            return Err(anyhow::anyhow!(
                "ALLOWED_TYPES must list at least one MIME type"
            ));
        }

        if self.db_max_connections == 0 {
            return Err(anyhow::anyhow!("DB_MAX_CONNECTIONS must be greater than 0"));
        }

        Ok(())
    }

    pub fn is_allowed_type(&self, mime: &str) -> bool {
        let mime = mime.to_lowercase();
        self.allowed_types.iter().any(|t| *t == mime)
    }
}
