//! Error types for connector requests

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Failures surfaced by the request client and connectors
#[derive(Error, Debug)]
pub enum ApiError {
    /// Timeouts or connection failures that outlasted every retry
    #[error("Transport error after {attempts} attempts: {message}")]
    Transport { attempts: u32, message: String },

    /// HTTP 401; never retried
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Any other HTTP status at or above 400
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// HTTP 429 kept coming back after the allowed number of waits
    #[error("Rate limited after {waits} waits")]
    RateLimited { waits: u32 },

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid credentials: {0}")]
    Credentials(String),

    /// No connector exists for the provider kind
    #[error("Provider not implemented: {0}")]
    UnsupportedProvider(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl ApiError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, ApiError::Authentication(_))
    }
}

/// Result type for connector operations
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ApiError::Http {
            status: 404,
            body: "Not found".to_string(),
        };
        assert_eq!(error.to_string(), "HTTP 404: Not found");

        let error = ApiError::Transport {
            attempts: 3,
            message: "timed out".to_string(),
        };
        assert_eq!(error.to_string(), "Transport error after 3 attempts: timed out");
    }

    #[test]
    fn test_bridge_error_conversion() {
        let error: ApiError = BridgeError::OperationFailed("tls".to_string()).into();
        assert!(matches!(error, ApiError::Bridge(_)));
        assert!(!error.is_authentication());
        assert!(ApiError::Authentication("expired".to_string()).is_authentication());
    }
}
