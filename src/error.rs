use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure taxonomy shared by the normalizer and the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFormat,
    FetchError,
    InvalidParameter,
    Unauthorized,
    PayloadTooLarge,
    ServerError,
    NetworkError,
    MalformedResponse,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::FetchError => "fetch_error",
            ErrorKind::InvalidParameter => "invalid_parameter",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::ServerError => "server_error",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::Config => "config",
        }
    }

    /// Maps a non-200 HTTP status to the kind reported to the caller.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorKind::Unauthorized,
            413 => ErrorKind::PayloadTooLarge,
            400..=499 => ErrorKind::InvalidParameter,
            500..=599 => ErrorKind::ServerError,
            _ => ErrorKind::MalformedResponse,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("Image fetch failed: {0}")]
    FetchError(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Server error: {0}")]
    ServerError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::UnsupportedFormat => PipelineError::UnsupportedFormat(message),
            ErrorKind::FetchError => PipelineError::FetchError(message),
            ErrorKind::InvalidParameter => PipelineError::InvalidParameter(message),
            ErrorKind::Unauthorized => PipelineError::Unauthorized(message),
            ErrorKind::PayloadTooLarge => PipelineError::PayloadTooLarge(message),
            ErrorKind::ServerError => PipelineError::ServerError(message),
            ErrorKind::NetworkError => PipelineError::NetworkError(message),
            ErrorKind::MalformedResponse => PipelineError::MalformedResponse(message),
            ErrorKind::Config => PipelineError::ConfigError(message),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            PipelineError::FetchError(_) => ErrorKind::FetchError,
            PipelineError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            PipelineError::Unauthorized(_) => ErrorKind::Unauthorized,
            PipelineError::PayloadTooLarge(_) => ErrorKind::PayloadTooLarge,
            PipelineError::ServerError(_) => ErrorKind::ServerError,
            PipelineError::NetworkError(_) => ErrorKind::NetworkError,
            PipelineError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            PipelineError::ConfigError(_) => ErrorKind::Config,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Unauthorized);
        assert_eq!(ErrorKind::from_status(400), ErrorKind::InvalidParameter);
        assert_eq!(ErrorKind::from_status(406), ErrorKind::InvalidParameter);
        assert_eq!(ErrorKind::from_status(413), ErrorKind::PayloadTooLarge);
        assert_eq!(ErrorKind::from_status(500), ErrorKind::ServerError);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::ServerError);
        assert_eq!(ErrorKind::from_status(302), ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_kind_round_trips_through_error() {
        let err = PipelineError::new(ErrorKind::PayloadTooLarge, "too big");
        assert_eq!(err.kind(), ErrorKind::PayloadTooLarge);
        assert_eq!(err.to_string(), "Payload too large: too big");
    }
}
