//! Backend config adapter
//!
//! Buckets persist their connection parameters as a JSON object whose keys depend
//! on the bucket kind. [`BackendConfig`] is the typed view of that object. Every
//! field is decoded with a checked accessor so that a missing key or a value of the
//! wrong JSON type becomes a [`ConfigError`] instead of a panic.

use serde_json::{Map, Number, Value};

use crate::storage_types::BucketKind;

/// Opaque key/value bag as stored in the `buckets.config` column.
pub type ConfigMap = Map<String, Value>;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing config key: {0}")]
    MissingField(String),

    #[error("config key {key} must be a {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("field {0} is required")]
    EmptyField(String),

    #[error("invalid capacity: {0}")]
    InvalidCapacity(String),
}

/// S3-compatible credentials, shared by the `s3` and `r2` kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Config {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FtpConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebDavConfig {
    pub url: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Chat the bot posts into (`tg_receivers`).
    pub chat_id: String,
}

/// Typed connection descriptor for one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Local,
    S3(S3Config),
    R2(S3Config),
    Ftp(FtpConfig),
    WebDav(WebDavConfig),
    Telegram(TelegramConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> BucketKind {
        match self {
            BackendConfig::Local => BucketKind::Default,
            BackendConfig::S3(_) => BucketKind::S3,
            BackendConfig::R2(_) => BucketKind::R2,
            BackendConfig::Ftp(_) => BucketKind::Ftp,
            BackendConfig::WebDav(_) => BucketKind::WebDav,
            BackendConfig::Telegram(_) => BucketKind::Telegram,
        }
    }

    /// Decode the stored JSON value of a bucket of the given kind.
    pub fn from_value(kind: BucketKind, value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(map) => Self::from_map(kind, map),
            Value::Null if kind == BucketKind::Default => Ok(BackendConfig::Local),
            _ => Err(ConfigError::WrongType {
                key: "config".to_string(),
                expected: "object",
            }),
        }
    }

    pub fn from_map(kind: BucketKind, map: &ConfigMap) -> Result<Self, ConfigError> {
        Ok(match kind {
            BucketKind::Default => BackendConfig::Local,
            BucketKind::S3 => BackendConfig::S3(s3_from_map(map, "s3")?),
            BucketKind::R2 => BackendConfig::R2(s3_from_map(map, "r2")?),
            BucketKind::Ftp => BackendConfig::Ftp(FtpConfig {
                host: string_field(map, "ftp_host")?,
                user: string_field(map, "ftp_user")?,
                password: string_field(map, "ftp_pass")?,
                port: port_field(map, "ftp_port")?,
            }),
            BucketKind::WebDav => BackendConfig::WebDav(WebDavConfig {
                url: string_field(map, "webdav_url")?,
                user: string_field(map, "webdav_user")?,
                password: string_field(map, "webdav_pass")?,
            }),
            BucketKind::Telegram => BackendConfig::Telegram(TelegramConfig {
                bot_token: string_field(map, "tg_bot_token")?,
                chat_id: string_field(map, "tg_receivers")?,
            }),
        })
    }

    pub fn to_map(&self) -> ConfigMap {
        let mut map = ConfigMap::new();
        match self {
            BackendConfig::Local => {}
            BackendConfig::S3(c) => s3_to_map(&mut map, c, "s3"),
            BackendConfig::R2(c) => s3_to_map(&mut map, c, "r2"),
            BackendConfig::Ftp(c) => {
                put(&mut map, "ftp_host", &c.host);
                put(&mut map, "ftp_user", &c.user);
                put(&mut map, "ftp_pass", &c.password);
                map.insert("ftp_port".to_string(), Value::Number(Number::from(c.port)));
            }
            BackendConfig::WebDav(c) => {
                put(&mut map, "webdav_url", &c.url);
                put(&mut map, "webdav_user", &c.user);
                put(&mut map, "webdav_pass", &c.password);
            }
            BackendConfig::Telegram(c) => {
                put(&mut map, "tg_bot_token", &c.bot_token);
                put(&mut map, "tg_receivers", &c.chat_id);
            }
        }
        map
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.to_map())
    }

    /// Reject descriptors with an empty string field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in self.to_map() {
            if matches!(&value, Value::String(s) if s.trim().is_empty()) {
                return Err(ConfigError::EmptyField(key));
            }
        }
        Ok(())
    }

    /// All-empty descriptor for a kind, used when a bucket is created without
    /// credentials (legacy data migration).
    pub fn placeholder(kind: BucketKind) -> Self {
        match kind {
            BucketKind::Default => BackendConfig::Local,
            BucketKind::S3 => BackendConfig::S3(S3Config::default()),
            BucketKind::R2 => BackendConfig::R2(S3Config::default()),
            BucketKind::Ftp => BackendConfig::Ftp(FtpConfig::default()),
            BucketKind::WebDav => BackendConfig::WebDav(WebDavConfig::default()),
            BucketKind::Telegram => BackendConfig::Telegram(TelegramConfig::default()),
        }
    }
}

impl S3Config {
    /// Signing region for the kind this config belongs to.
    pub fn region_for(kind: BucketKind) -> &'static str {
        match kind {
            BucketKind::R2 => "auto",
            _ => "us-east-1",
        }
    }
}

/// Convert an admin-entered capacity in GB to bytes.
///
/// The input is rounded to two decimals first and must be positive.
pub fn capacity_from_gb(input: &str) -> Result<i64, ConfigError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidCapacity("capacity is required".to_string()));
    }
    let gb: f64 = trimmed
        .parse()
        .map_err(|_| ConfigError::InvalidCapacity(format!("not a number: {}", trimmed)))?;
    if !gb.is_finite() || gb <= 0.0 {
        return Err(ConfigError::InvalidCapacity(
            "capacity must be greater than 0".to_string(),
        ));
    }
    let rounded = (gb * 100.0).round() / 100.0;
    Ok((rounded * BYTES_PER_GB) as i64)
}

fn s3_from_map(map: &ConfigMap, prefix: &str) -> Result<S3Config, ConfigError> {
    Ok(S3Config {
        endpoint: string_field(map, &format!("{}_endpoint", prefix))?,
        access_key: string_field(map, &format!("{}_access_key", prefix))?,
        secret_key: string_field(map, &format!("{}_secret_key", prefix))?,
        bucket: string_field(map, &format!("{}_bucket", prefix))?,
    })
}

fn s3_to_map(map: &mut ConfigMap, c: &S3Config, prefix: &str) {
    put(map, &format!("{}_endpoint", prefix), &c.endpoint);
    put(map, &format!("{}_access_key", prefix), &c.access_key);
    put(map, &format!("{}_secret_key", prefix), &c.secret_key);
    put(map, &format!("{}_bucket", prefix), &c.bucket);
}

fn put(map: &mut ConfigMap, key: &str, value: &str) {
    map.insert(key.to_string(), Value::String(value.to_string()));
}

fn string_field(map: &ConfigMap, key: &str) -> Result<String, ConfigError> {
    match map.get(key) {
        None => Err(ConfigError::MissingField(key.to_string())),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ConfigError::WrongType {
            key: key.to_string(),
            expected: "string",
        }),
    }
}

fn port_field(map: &ConfigMap, key: &str) -> Result<u16, ConfigError> {
    let wrong_type = || ConfigError::WrongType {
        key: key.to_string(),
        expected: "port number",
    };
    let number = match map.get(key) {
        None => return Err(ConfigError::MissingField(key.to_string())),
        Some(Value::Number(n)) => n,
        Some(_) => return Err(wrong_type()),
    };
    if let Some(port) = number.as_u64() {
        return u16::try_from(port).map_err(|_| wrong_type());
    }
    // JSON clients frequently send 21.0
    match number.as_f64() {
        Some(f) if f.fract() == 0.0 && (0.0..=u16::MAX as f64).contains(&f) => Ok(f as u16),
        _ => Err(wrong_type()),
    }
}
