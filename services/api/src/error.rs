//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use crate::config::ConfigError;
use axum::http::StatusCode;
use classroom_agent_core::ports::PortError;
use tracing::error;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Maps a port error onto the HTTP status a client should see.
pub fn port_status(error: &PortError) -> StatusCode {
    match error {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Conflict(_) => StatusCode::CONFLICT,
        PortError::Unauthorized | PortError::AuthMissing => StatusCode::UNAUTHORIZED,
        PortError::Network(_) | PortError::Platform { .. } => StatusCode::BAD_GATEWAY,
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// The `(StatusCode, String)` rejection handlers return for a failed port call.
pub fn port_rejection(context: &str, error: PortError) -> (StatusCode, String) {
    let status = port_status(&error);
    if status.is_server_error() {
        error!(error = %error, kind = error.kind(), "{}", context);
    }
    (status, format!("{}: {}", context, error))
}
