//! Error types for the replication engine
//!
//! Transient per-page failures (network noise, non-2xx responses) are not
//! errors here: they are reported as data on [`crate::replication::PageResult`].
//! The variants below are the failures that stop a run.

use thiserror::Error;

/// Failures of the auth provider. All of them are fatal to the current run.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Auth provider used before it was initialized")]
    NotInitialized,

    #[error("Auth provider was already initialized")]
    AlreadyInitialized,

    #[error("Token request to {token_uri} failed: {source}")]
    TokenRequest {
        token_uri: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Token endpoint {token_uri} rejected the request with HTTP {status}: {body}")]
    TokenRejected {
        token_uri: String,
        status: u16,
        body: String,
    },

    #[error("Token endpoint {token_uri} returned no access token")]
    MissingToken { token_uri: String },

    #[error("Access token cannot be used as a header value")]
    InvalidHeader,
}

/// Errors that abort replication of a descriptor or the whole run.
#[derive(Error, Debug)]
pub enum ReplicationError {
    #[error("Unsupported replication strategy: {0}")]
    UnsupportedStrategy(String),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid request URI '{uri}': {message}")]
    InvalidUri { uri: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReplicationError {
    /// Whether this error came from the auth provider
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

pub type Result<T> = std::result::Result<T, ReplicationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_converts_into_replication_error() {
        let err: ReplicationError = AuthError::NotInitialized.into();
        assert!(err.is_auth());
        assert!(err.to_string().contains("before it was initialized"));
    }

    #[test]
    fn test_unsupported_strategy_message() {
        let err = ReplicationError::UnsupportedStrategy("TimestampAsc".to_string());
        assert_eq!(err.to_string(), "Unsupported replication strategy: TimestampAsc");
        assert!(!err.is_auth());
    }
}
