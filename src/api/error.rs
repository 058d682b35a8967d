//! Error types for the Insider API client

use thiserror::Error;

/// Result type for client operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced by [`super::InsiderClient`]
///
/// Each variant carries a human-readable message and nothing else. Callers
/// decide how to react by matching on the variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Bad credentials, or the token could not be refreshed after a retry
    #[error("{0}")]
    Authentication(String),

    /// Network or transport failure
    #[error("{0}")]
    Connection(String),

    /// Unexpected status code or response body
    #[error("{0}")]
    Api(String),
}

impl ApiError {
    /// Create an authentication error
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a generic API error
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// Check whether this is an authentication failure
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// Get the message without the variant
    pub fn message(&self) -> &str {
        match self {
            Self::Authentication(msg) | Self::Connection(msg) | Self::Api(msg) => msg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_bare_message() {
        assert_eq!(ApiError::api("Test error").to_string(), "Test error");
        assert_eq!(ApiError::authentication("Auth failed").to_string(), "Auth failed");
        assert_eq!(
            ApiError::connection("Connection failed").to_string(),
            "Connection failed"
        );
    }

    #[test]
    fn test_is_authentication() {
        assert!(ApiError::authentication("x").is_authentication());
        assert!(!ApiError::connection("x").is_authentication());
        assert!(!ApiError::api("x").is_authentication());
    }

    #[test]
    fn test_message() {
        assert_eq!(ApiError::connection("down").message(), "down");
    }
}
