//! Error types for the grade sync crate.

use thiserror::Error;

use kelasi_core::sync::{conflict_message, ServerGrade, NETWORK_ERROR_FALLBACK};

/// Result type alias for grade sync operations.
pub type Result<T> = std::result::Result<T, GradeApiError>;

/// Errors that can occur while talking to the grade API.
#[derive(Debug, Error)]
pub enum GradeApiError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server holds a newer value for the targeted grade cell
    #[error("Conflict: grade already updated by {}", .server.updated_by_name)]
    Conflict { server: ServerGrade },

    /// API error response from the grade service
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid request (missing required data, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl GradeApiError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP status if the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Conflict { .. } => Some(409),
            _ => None,
        }
    }

    /// Text recorded on a failed queue item.
    ///
    /// Transport failures collapse to the generic network message the UI
    /// shows, and server-provided messages pass through unchanged. A
    /// conflict records the same wording a sync pass stores, naming the
    /// other editor.
    pub fn failure_text(&self) -> String {
        match self {
            Self::Http(_) => NETWORK_ERROR_FALLBACK.to_string(),
            Self::Conflict { server } => conflict_message(&server.updated_by_name),
            Self::Api { message, .. } => {
                if message.trim().is_empty() {
                    NETWORK_ERROR_FALLBACK.to_string()
                } else {
                    message.clone()
                }
            }
            other => other.to_string(),
        }
    }
}
