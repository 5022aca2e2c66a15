//! Error types for the synchronization core.

use thiserror::Error;

/// Main error type for sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport failure. Retryable by user action, never retried automatically.
    #[error("Network error: {0}")]
    Network(String),

    /// The session is no longer valid (401-class response).
    #[error("Session expired or unauthorized")]
    Auth,

    /// Non-2xx response other than an auth failure, or a timed-out request.
    #[error("Server error ({}): {message}", status_label(.status))]
    Server { status: Option<u16>, message: String },

    /// A completion arrived for a superseded generation. Never surfaced.
    #[error("Result belongs to a stale generation")]
    Stale,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("No active session")]
    NotSignedIn,
}

impl SyncError {
    /// Construct a server error without an HTTP status (timeouts, protocol errors).
    pub fn server(message: impl Into<String>) -> Self {
        SyncError::Server {
            status: None,
            message: message.into(),
        }
    }

    /// True for errors that invalidate the session.
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Auth)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return SyncError::server("request timed out");
        }
        if e.is_decode() {
            return SyncError::Serialization(e.to_string());
        }
        if let Some(status) = e.status() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return SyncError::Auth;
            }
            return SyncError::Server {
                status: Some(status.as_u16()),
                message: e.to_string(),
            };
        }
        SyncError::Network(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::Http(response) if response.status().as_u16() == 401 => SyncError::Auth,
            other => SyncError::Network(other.to_string()),
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "no status".to_string(),
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
