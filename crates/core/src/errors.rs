//! Core error types for ClientDesk.
//!
//! This module defines backend-agnostic error types. Adapter-specific errors
//! (HTTP, websocket, JSON) are converted to these types at the
//! [`DataSource`](crate::sync::DataSource) boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the sync core.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown data domain: {0}")]
    UnknownDomain(String),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to decode record: {0}")]
    Decode(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Change feed connection lost: {0}")]
    ConnectionLost(String),

    #[error("Subscription failed: {0}")]
    Subscription(String),

    #[error("Failed to load configuration: {0}")]
    ConfigIO(String),

    #[error("Invalid configuration value: {0}")]
    InvalidConfigValue(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

/// Errors raised while validating rows at the data-access boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Option '{option}' is not allowed for field {field}")]
    UnknownOption { field: String, option: String },

    #[error("Field {field} expects a {expected} value")]
    KindMismatch { field: String, expected: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Recoverable conditions surfaced to the view layer.
///
/// None of these are fatal: the worst case is a visibly stale collection that
/// the user can fix with a manual refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SyncErrorKind {
    /// The change feed dropped. Resubscribe on the next mount or via retry.
    ConnectionLost { reason: String },
    /// A refetch failed. The previous collection is still shown.
    FetchFailed { message: String },
}

impl SyncErrorKind {
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    pub fn fetch_failed(message: impl Into<String>) -> Self {
        Self::FetchFailed {
            message: message.into(),
        }
    }
}

impl From<&Error> for SyncErrorKind {
    fn from(err: &Error) -> Self {
        match err {
            Error::ConnectionLost(reason) => SyncErrorKind::connection_lost(reason.clone()),
            other => SyncErrorKind::fetch_failed(other.to_string()),
        }
    }
}
