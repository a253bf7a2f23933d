use crate::error::ProcessingError;

/// Upload validator
///
/// Checks size and declared content type before any decoding happens.
#[derive(Debug, Clone)]
pub struct UploadValidator {
    max_file_size: usize,
    allowed_types: Vec<String>,
}

impl UploadValidator {
    pub fn new(max_file_size: usize, allowed_types: Vec<String>) -> Self {
        Self {
            max_file_size,
            allowed_types: allowed_types
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .collect(),
        }
    }

    pub fn validate_file_size(&self, size: usize) -> Result<(), ProcessingError> {
        if size > self.max_file_size {
            return Err(ProcessingError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }
        Ok(())
    }

    pub fn validate_content_type(&self, content_type: &str) -> Result<(), ProcessingError> {
        let normalized = content_type.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ProcessingError::MissingContentType);
        }

        if !self.allowed_types.iter().any(|t| *t == normalized) {
            return Err(ProcessingError::UnsupportedContentType {
                content_type: content_type.to_string(),
                allowed: self.allowed_types.join(", "),
            });
        }

        Ok(())
    }

    /// Size first, then content type.
    pub fn validate(&self, size: usize, content_type: &str) -> Result<(), ProcessingError> {
        self.validate_file_size(size)?;
        self.validate_content_type(content_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> UploadValidator {
        UploadValidator::new(
            1024,
            vec!["image/jpeg".to_string(), "Image/PNG".to_string()],
        )
    }

    #[test]
    fn test_file_too_large() {
        let err = validator().validate(1025, "image/png").unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::FileTooLarge {
                size: 1025,
                max: 1024
            }
        ));
        assert!(validator().validate(1024, "image/png").is_ok());
    }

    #[test]
    fn test_missing_content_type() {
        let err = validator().validate(10, "  ").unwrap_err();
        assert!(matches!(err, ProcessingError::MissingContentType));
    }

    #[test]
    fn test_content_type_allow_list_is_case_insensitive() {
        assert!(validator().validate(10, "IMAGE/JPEG").is_ok());
        let err = validator().validate(10, "image/gif").unwrap_err();
        match err {
            ProcessingError::UnsupportedContentType {
                content_type,
                allowed,
            } => {
                assert_eq!(content_type, "image/gif");
                assert_eq!(allowed, "image/jpeg, image/png");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_size_checked_before_type() {
        let err = validator().validate(4096, "").unwrap_err();
        assert!(matches!(err, ProcessingError::FileTooLarge { .. }));
    }
}
