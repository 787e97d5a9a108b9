use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes shared with the remote API and surfaced to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoErrorCode {
    NetworkError,
    DecodeError,
    SrcNotSupported,
    Aborted,
    Unknown,
    UploadFailed,
    ProcessingFailed,
    FileTooLarge,
    UnsupportedFormat,
    InvalidParameters,
    ServerError,
    Timeout,
}

impl VideoErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoErrorCode::NetworkError => "NETWORK_ERROR",
            VideoErrorCode::DecodeError => "DECODE_ERROR",
            VideoErrorCode::SrcNotSupported => "SRC_NOT_SUPPORTED",
            VideoErrorCode::Aborted => "ABORTED",
            VideoErrorCode::Unknown => "UNKNOWN",
            VideoErrorCode::UploadFailed => "UPLOAD_FAILED",
            VideoErrorCode::ProcessingFailed => "PROCESSING_FAILED",
            VideoErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            VideoErrorCode::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            VideoErrorCode::InvalidParameters => "INVALID_PARAMETERS",
            VideoErrorCode::ServerError => "SERVER_ERROR",
            VideoErrorCode::Timeout => "TIMEOUT",
        }
    }
}

impl std::fmt::Display for VideoErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures reported by a media element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaErrorKind {
    Aborted,
    Network,
    Decode,
    SrcNotSupported,
}

impl std::fmt::Display for MediaErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            MediaErrorKind::Aborted => "playback aborted",
            MediaErrorKind::Network => "network failure while loading media",
            MediaErrorKind::Decode => "media could not be decoded",
            MediaErrorKind::SrcNotSupported => "media source not supported",
        };
        f.write_str(message)
    }
}

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("File size {size} exceeds maximum allowed size of {max}")]
    FileTooLarge {
        size: u64,
        max: u64,
    },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid parameters: {}", .0.join("; "))]
    InvalidParameters(Vec<String>),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Processing did not finish within {0:?}")]
    ProcessingTimeout(Duration),

    #[error("Upload was cancelled")]
    Cancelled,

    #[error("Media error: {0}")]
    Media(MediaErrorKind),

    #[error("Server error: status code {status_code}, message: {message}")]
    ServerError {
        status_code: u16,
        message: String,
    },

    #[error("HTTP Request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl VideoError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status_code,
            message: message.into(),
        }
    }

    pub fn upload_failed(message: impl Into<String>) -> Self {
        Self::UploadFailed(message.into())
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    pub fn code(&self) -> VideoErrorCode {
        match self {
            VideoError::FileTooLarge { .. } => VideoErrorCode::FileTooLarge,
            VideoError::UnsupportedFormat(_) => VideoErrorCode::UnsupportedFormat,
            VideoError::InvalidParameters(_) => VideoErrorCode::InvalidParameters,
            VideoError::UploadFailed(_) => VideoErrorCode::UploadFailed,
            VideoError::ProcessingFailed(_) => VideoErrorCode::ProcessingFailed,
            VideoError::ProcessingTimeout(_) => VideoErrorCode::Timeout,
            VideoError::Cancelled => VideoErrorCode::Aborted,
            VideoError::Media(kind) => match kind {
                MediaErrorKind::Aborted => VideoErrorCode::Aborted,
                MediaErrorKind::Network => VideoErrorCode::NetworkError,
                MediaErrorKind::Decode => VideoErrorCode::DecodeError,
                MediaErrorKind::SrcNotSupported => VideoErrorCode::SrcNotSupported,
            },
            VideoError::ServerError { .. } => VideoErrorCode::ServerError,
            VideoError::HttpError(err) if err.is_timeout() => VideoErrorCode::Timeout,
            VideoError::HttpError(_) => VideoErrorCode::NetworkError,
            VideoError::IoError(_) => VideoErrorCode::UploadFailed,
            VideoError::SerdeError(_)
            | VideoError::ConfigError(_)
            | VideoError::NotFound(_)
            | VideoError::Rejected(_)
            | VideoError::InternalError(_) => VideoErrorCode::Unknown,
        }
    }

    /// User cancellation is not a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, VideoError::Cancelled)
    }

    /// Validation errors are raised before any network call is made.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            VideoError::FileTooLarge { .. }
                | VideoError::UnsupportedFormat(_)
                | VideoError::InvalidParameters(_)
        )
    }
}

impl From<toml::de::Error> for VideoError {
    fn from(err: toml::de::Error) -> Self {
        VideoError::ConfigError(err.to_string())
    }
}

impl From<url::ParseError> for VideoError {
    fn from(err: url::ParseError) -> Self {
        VideoError::ConfigError(format!("Invalid url: {}", err))
    }
}

/// Error alias
pub type Result<T, E = VideoError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = VideoError::FileTooLarge { size: 10, max: 5 };
        assert_eq!(err.code(), VideoErrorCode::FileTooLarge);
        assert!(err.is_validation());

        assert_eq!(VideoError::Cancelled.code().as_str(), "ABORTED");
        assert!(VideoError::Cancelled.is_cancellation());

        let err = VideoError::Media(MediaErrorKind::SrcNotSupported);
        assert_eq!(err.code(), VideoErrorCode::SrcNotSupported);
        assert!(!err.is_validation());
    }

    #[test]
    fn test_invalid_parameters_message() {
        let err = VideoError::InvalidParameters(vec![
            "Title is required".to_string(),
            "Too many tags".to_string(),
        ]);
        assert_eq!(err.to_string(), "Invalid parameters: Title is required; Too many tags");
    }

    #[test]
    fn test_code_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&VideoErrorCode::ProcessingFailed).unwrap();
        assert_eq!(json, "\"PROCESSING_FAILED\"");
    }
}
