use anyhow::Context;
use oneimg_core::{AppConfig, AppError, ErrorMetadata, LogLevel};
use oneimg_services::{AppServices, MigrationReport, MigrationStatus};
use serde::Serialize;
use std::path::Path;

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Load the environment config, connect, migrate the schema and build the services.
pub async fn connect() -> anyhow::Result<AppServices> {
    let config = AppConfig::from_env().context("Invalid configuration")?;
    let pool = oneimg_db::setup_database(&config).await?;
    Ok(AppServices::new(config, pool))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// What a failed service call shows on the command line.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<&'static str>,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        ErrorBody {
            error: err.client_message(),
            code: err.error_code(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
        }
    }
}

/// Log a service error at its own level and turn it into a CLI failure.
pub fn service_error(err: AppError) -> anyhow::Error {
    let body = ErrorBody::from(&err);
    match err.log_level() {
        LogLevel::Debug => tracing::debug!(code = body.code, error = %err, "Request rejected"),
        LogLevel::Warn => tracing::warn!(code = body.code, error = %err, "Request failed"),
        LogLevel::Error => tracing::error!(code = body.code, error = %err, "Request failed"),
    }
    match body.suggested_action {
        Some(action) => anyhow::anyhow!("[{}] {} ({})", body.code, body.error, action),
        None => anyhow::anyhow!("[{}] {}", body.code, body.error),
    }
}

/// Content type for a local file, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

pub fn report_table(report: &MigrationReport) -> String {
    let mut out = format!("{:<10} {:>6}  {:<9} {}\n", "KIND", "BUCKET", "STATUS", "DETAIL");
    for outcome in &report.outcomes {
        let (status, detail) = match &outcome.status {
            MigrationStatus::Migrated { images, usage } => {
                ("migrated", format!("{} images, {} bytes", images, usage))
            }
            MigrationStatus::Skipped { already_assigned } => {
                ("skipped", format!("{} already assigned", already_assigned))
            }
            MigrationStatus::Failed { error } => ("failed", error.clone()),
        };
        out.push_str(&format!(
            "{:<10} {:>6}  {:<9} {}\n",
            outcome.kind.as_str(), outcome.bucket_id, status, detail
        ));
    }
    for (storage, count) in &report.unknown_storage {
        out.push_str(&format!("unknown storage {:?}: {} images left untouched\n", storage, count));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use oneimg_core::BucketKind;
    use oneimg_services::KindOutcome;

    #[test]
    fn content_type_by_extension() {
        assert_eq!(content_type_for(Path::new("a/b/Cat.JPG")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("logo.svg")), "image/svg+xml");
        assert_eq!(content_type_for(Path::new("README")), "application/octet-stream");
    }

    #[test]
    fn service_error_carries_code_and_action() {
        let err = service_error(AppError::NotFound("Image 7 not found".to_string()));
        let text = err.to_string();
        assert!(text.starts_with("[NOT_FOUND]"));

        let body = ErrorBody::from(&AppError::UnsupportedMediaType("text/plain".to_string()));
        assert_eq!(body.code, "UNSUPPORTED_MEDIA_TYPE");
        assert!(!body.recoverable);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["suggested_action"], "Upload one of the allowed image types");
    }

    #[test]
    fn report_table_lists_each_kind() {
        let mut report = MigrationReport {
            outcomes: vec![
                KindOutcome {
                    kind: BucketKind::S3,
                    bucket_id: 2,
                    status: MigrationStatus::Migrated { images: 3, usage: 300 },
                },
                KindOutcome {
                    kind: BucketKind::Ftp,
                    bucket_id: 4,
                    status: MigrationStatus::Failed {
                        error: "boom".to_string(),
                    },
                },
            ],
            ..Default::default()
        };
        report.unknown_storage.insert("nfs".to_string(), 2);

        let table = report_table(&report);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("s3"));
        assert!(lines[1].ends_with("3 images, 300 bytes"));
        assert!(lines[2].contains("failed"));
        assert!(lines[3].contains("\"nfs\": 2 images"));
    }
}
