use crate::error::{ErrorKind, PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    /// Truncated, credential-free response body.
    pub diagnostic: Option<String>,
    pub endpoint: Option<String>,
}

impl GenerationFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            diagnostic: None,
            endpoint: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

impl From<PipelineError> for GenerationFailure {
    fn from(err: PipelineError) -> Self {
        let kind = err.kind();
        let message = match err {
            PipelineError::UnsupportedFormat(m)
            | PipelineError::FetchError(m)
            | PipelineError::InvalidParameter(m)
            | PipelineError::Unauthorized(m)
            | PipelineError::PayloadTooLarge(m)
            | PipelineError::ServerError(m)
            | PipelineError::NetworkError(m)
            | PipelineError::MalformedResponse(m)
            | PipelineError::ConfigError(m) => m,
        };
        GenerationFailure::new(kind, message)
    }
}

impl From<GenerationFailure> for PipelineError {
    fn from(failure: GenerationFailure) -> Self {
        let message = match failure.status {
            Some(status) => format!("Error {}: {}", status, failure.message),
            None => failure.message,
        };
        PipelineError::new(failure.kind, message)
    }
}

impl fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Outcome of one dispatch. Every path through the dispatcher ends in one
/// of these; nothing is raised across the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    MediaBytes {
        bytes: Vec<u8>,
        mime: String,
        endpoint: String,
    },
    MediaReference {
        url: String,
        endpoint: String,
    },
    Failure(GenerationFailure),
}

impl GenerationResult {
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        GenerationResult::Failure(GenerationFailure::new(kind, message))
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, GenerationResult::Failure(_))
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            GenerationResult::MediaBytes { endpoint, .. }
            | GenerationResult::MediaReference { endpoint, .. } => Some(endpoint),
            GenerationResult::Failure(failure) => failure.endpoint.as_deref(),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            GenerationResult::Failure(failure) => Some(failure.kind),
            _ => None,
        }
    }

    /// Short outcome line for history and logs.
    pub fn summary(&self) -> String {
        match self {
            GenerationResult::MediaBytes { bytes, mime, .. } => {
                format!("{} ({} bytes)", mime, bytes.len())
            }
            GenerationResult::MediaReference { url, .. } => format!("reference {}", url),
            GenerationResult::Failure(failure) => failure.to_string(),
        }
    }

    pub fn into_result(self) -> Result<Self> {
        match self {
            GenerationResult::Failure(failure) => Err(failure.into()),
            success => Ok(success),
        }
    }
}

/// File extension for a media MIME type, used when callers persist output.
pub fn extension_for_mime(mime: &str) -> &'static str {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    match essence {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        other if other.starts_with("video/") => "mp4",
        _ => "bin",
    }
}
