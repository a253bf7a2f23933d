use oneimg_core::AppError;

/// Failures of upload validation and image processing. None of them is retried.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("Missing content type")]
    MissingContentType,

    #[error("Unsupported content type: {content_type} (allowed: {allowed})")]
    UnsupportedContentType {
        content_type: String,
        allowed: String,
    },

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Watermark failed: {0}")]
    Watermark(String),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Processing task failed: {0}")]
    Task(String),
}

impl From<ProcessingError> for AppError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::FileTooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            ProcessingError::MissingContentType => AppError::BadRequest(err.to_string()),
            ProcessingError::UnsupportedContentType { .. } => {
                AppError::UnsupportedMediaType(err.to_string())
            }
            ProcessingError::UnsupportedFormat(_) => AppError::ImageProcessing(err.to_string()),
            ProcessingError::Watermark(_) | ProcessingError::Encode(_) => {
                AppError::ImageProcessing(err.to_string())
            }
            ProcessingError::Task(_) => AppError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oneimg_core::ErrorMetadata;

    #[test]
    fn test_validation_errors_map_to_client_statuses() {
        let too_large: AppError = ProcessingError::FileTooLarge { size: 20, max: 10 }.into();
        assert_eq!(too_large.http_status_code(), 413);

        let missing: AppError = ProcessingError::MissingContentType.into();
        assert_eq!(missing.http_status_code(), 400);

        let unsupported: AppError = ProcessingError::UnsupportedContentType {
            content_type: "text/plain".to_string(),
            allowed: "image/png".to_string(),
        }
        .into();
        assert_eq!(unsupported.http_status_code(), 415);
        assert!(unsupported.client_message().contains("text/plain"));
    }
}
