//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Presign failed: {0}")]
    PresignFailed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey(key.into())
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::UploadFailed(_)
            | StorageError::PresignFailed(_)
            | StorageError::AwsSdk(_) => true,
            StorageError::Io(e) => e.kind() != std::io::ErrorKind::NotFound,
            StorageError::ConfigError(_) | StorageError::InvalidKey(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StorageError::upload_failed("connection reset").is_retryable());
        assert!(!StorageError::config_error("R2_BUCKET_NAME not set").is_retryable());
        assert!(!StorageError::invalid_key("").is_retryable());

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(!StorageError::from(missing).is_retryable());
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(StorageError::from(reset).is_retryable());
    }
}
