use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Bucket id reserved for the immutable local default bucket.
pub const DEFAULT_BUCKET_ID: i32 = 1;

/// Storage bucket kinds
///
/// The set is closed: every bucket row carries exactly one of these tags and
/// upload/delete routing is selected from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "bucket_kind", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    Default,
    S3,
    R2,
    Ftp,
    WebDav,
    Telegram,
}

impl BucketKind {
    pub const ALL: [BucketKind; 6] = [
        BucketKind::Default,
        BucketKind::S3,
        BucketKind::R2,
        BucketKind::Ftp,
        BucketKind::WebDav,
        BucketKind::Telegram,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BucketKind::Default => "default",
            BucketKind::S3 => "s3",
            BucketKind::R2 => "r2",
            BucketKind::Ftp => "ftp",
            BucketKind::WebDav => "webdav",
            BucketKind::Telegram => "telegram",
        }
    }

    /// Kinds whose capacity is never enforced.
    pub fn is_unmetered(self) -> bool {
        matches!(self, BucketKind::Default | BucketKind::Telegram)
    }
}

impl FromStr for BucketKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(BucketKind::Default),
            "s3" => Ok(BucketKind::S3),
            "r2" => Ok(BucketKind::R2),
            "ftp" => Ok(BucketKind::Ftp),
            "webdav" => Ok(BucketKind::WebDav),
            "telegram" => Ok(BucketKind::Telegram),
            _ => Err(anyhow::anyhow!("Invalid bucket kind: {}", s)),
        }
    }
}

impl Display for BucketKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}
