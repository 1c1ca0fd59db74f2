//! Gateway error taxonomy.
//!
//! Every failure the pipeline can observe is a [`GatewayError`]: a kind
//! plus a context message and, for backend failures, the upstream status.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failure, which fixes how it reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing file, wrong MIME type, malformed options, unreadable upload.
    InputValidation,
    /// Unknown or unresolved backend version.
    Configuration,
    /// Transport failure talking to the backend.
    Backend,
    /// Audit snapshot write failed. Logged only.
    Persistence,
    /// Staged file release failed. Logged only.
    Cleanup,
    /// Session lifecycle violation or other unexpected failure.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InputValidation => "input_validation",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Backend => "backend",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Cleanup => "cleanup",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged gateway error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
    /// Upstream HTTP status, when one was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Result type for pipeline operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn input_validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InputValidation, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Backend, message)
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Persistence, message)
    }

    pub fn cleanup(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cleanup, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// HTTP status returned to the caller.
    pub fn http_status(&self) -> u16 {
        match self.kind {
            ErrorKind::InputValidation | ErrorKind::Configuration => 400,
            ErrorKind::Backend => self.status.unwrap_or(500),
            ErrorKind::Persistence | ErrorKind::Cleanup | ErrorKind::Internal => 500,
        }
    }

    /// Message safe to show the caller.
    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::InputValidation | ErrorKind::Configuration => self.message.clone(),
            ErrorKind::Backend => "Analysis backend unavailable".to_string(),
            ErrorKind::Persistence | ErrorKind::Cleanup | ErrorKind::Internal => {
                "Internal error".to_string()
            }
        }
    }
}
