//! Common error types used across all Presto datasource crates

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base error type for all datasource operations
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum PrestoError {
    // Input errors, raised before anything reaches the engine
    #[error("Invalid interval: {input}")]
    InvalidInterval { input: String },

    #[error("Invalid date: {input}")]
    InvalidDate { input: String },

    #[error("Unknown ttl duration format: {ttl}")]
    InvalidTtl { ttl: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        message: String,
        field: Option<String>,
    },

    // Terminal engine failures
    #[error("PrestoDB Error: {body}")]
    Engine { status: u16, body: String },

    // Data errors
    #[error("Dashboard not found: {id}")]
    DashboardNotFound { id: String },

    #[error("Could not delete dashboard {id}: {message}")]
    DashboardDelete { id: String, message: String },

    #[error("Failed to save dashboard {title}: {message}")]
    DashboardSave { title: String, message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Data parse error: {message}")]
    DataParse { message: String },

    // Request lifecycle
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Request timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

impl PrestoError {
    /// Status code carried by a terminal engine failure
    pub fn status(&self) -> Option<u16> {
        match self {
            PrestoError::Engine { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Input errors are the caller's fault and never worth retrying
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            PrestoError::InvalidInterval { .. }
                | PrestoError::InvalidDate { .. }
                | PrestoError::InvalidTtl { .. }
                | PrestoError::InvalidConfig { .. }
        )
    }

    pub fn storage(message: impl std::fmt::Display) -> Self {
        PrestoError::Storage {
            message: message.to_string(),
        }
    }
}

/// Result type alias for datasource operations
pub type PrestoResult<T> = Result<T, PrestoError>;

impl From<serde_json::Error> for PrestoError {
    fn from(err: serde_json::Error) -> Self {
        PrestoError::DataParse {
            message: err.to_string(),
        }
    }
}

/// Helper macro for converting Results to PrestoResult
#[macro_export]
macro_rules! map_presto_error {
    ($result:expr, $error_variant:ident, $message:expr) => {
        $result.map_err(|e| $crate::errors::PrestoError::$error_variant {
            message: format!("{}: {}", $message, e),
        })
    };
}
