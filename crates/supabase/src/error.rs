//! Error types for the Supabase adapter.

use thiserror::Error;

/// Result type alias for Supabase operations.
pub type Result<T> = std::result::Result<T, SupabaseError>;

/// Errors that can occur while talking to PostgREST or Realtime.
#[derive(Debug, Error)]
pub enum SupabaseError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error response from PostgREST
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Websocket transport error or unexpected close
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Realtime refused to join a channel
    #[error("Channel join rejected: {0}")]
    JoinRejected(String),

    /// Invalid request (missing configuration, bad header value, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl SupabaseError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn websocket(message: impl Into<String>) -> Self {
        Self::WebSocket(message.into())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SupabaseError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

impl From<SupabaseError> for clientdesk_core::Error {
    fn from(err: SupabaseError) -> Self {
        use clientdesk_core::Error;
        match err {
            SupabaseError::Http(_) | SupabaseError::Api { .. } | SupabaseError::Json(_) => {
                Error::FetchFailed(err.to_string())
            }
            SupabaseError::WebSocket(_) => Error::ConnectionLost(err.to_string()),
            SupabaseError::JoinRejected(_) => Error::Subscription(err.to_string()),
            SupabaseError::InvalidRequest(msg) => Error::InvalidConfigValue(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_to_core_error() {
        let core: clientdesk_core::Error = SupabaseError::api(503, "unavailable").into();
        assert!(matches!(core, clientdesk_core::Error::FetchFailed(_)));

        let core: clientdesk_core::Error = SupabaseError::websocket("reset").into();
        assert!(matches!(core, clientdesk_core::Error::ConnectionLost(_)));

        let core: clientdesk_core::Error = SupabaseError::JoinRejected("denied".into()).into();
        assert!(matches!(core, clientdesk_core::Error::Subscription(_)));
    }
}
