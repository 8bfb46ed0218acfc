//! Error types for the remote ledger client.

use thiserror::Error;

/// Result type alias for ledger client operations.
pub type Result<T> = std::result::Result<T, LedgerClientError>;

/// Errors that can occur while talking to the remote ledger API.
#[derive(Debug, Error)]
pub enum LedgerClientError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from the ledger service
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body did not match the expected envelope shape
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Authentication error (missing or invalid token)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl LedgerClientError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a malformed-response error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<LedgerClientError> for tallybook_core::sync::FetchError {
    fn from(err: LedgerClientError) -> Self {
        use tallybook_core::sync::FetchError;
        match err {
            LedgerClientError::Api { status, message } => FetchError::Api { status, message },
            LedgerClientError::Malformed(message) => FetchError::Malformed(message),
            LedgerClientError::Json(err) => FetchError::Malformed(err.to_string()),
            LedgerClientError::Http(err) => FetchError::Transport(err.to_string()),
            LedgerClientError::Auth(message) => FetchError::Api {
                status: 401,
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tallybook_core::sync::FetchError;

    #[test]
    fn api_error_keeps_its_status() {
        let err = LedgerClientError::api(503, "maintenance window");
        assert_eq!(err.status_code(), Some(503));
        match FetchError::from(err) {
            FetchError::Api { status, .. } => assert_eq!(status, 503),
            other => panic!("unexpected mapping: {:?}", other),
        }
    }

    #[test]
    fn decode_failures_map_to_malformed() {
        let err = LedgerClientError::malformed("missing pagination key");
        assert!(matches!(FetchError::from(err), FetchError::Malformed(_)));
    }
}
