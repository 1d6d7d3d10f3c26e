//! Error types for the Microsoft Graph provider

use core_connector::ApiError;
use thiserror::Error;

/// Microsoft Graph provider errors
#[derive(Error, Debug)]
pub enum GraphError {
    /// A required client-credential field is absent
    #[error("Microsoft Graph credential '{0}' not found")]
    MissingCredential(&'static str),

    /// The token endpoint rejected or failed the request
    #[error("Token acquisition failed: {0}")]
    TokenAcquisition(String),

    /// The token endpoint answered with something other than a token
    #[error("Failed to parse token response: {0}")]
    TokenResponse(String),
}

/// Result type for Microsoft Graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

impl From<GraphError> for ApiError {
    fn from(error: GraphError) -> Self {
        match error {
            GraphError::MissingCredential(_) => ApiError::Credentials(error.to_string()),
            GraphError::TokenAcquisition(_) | GraphError::TokenResponse(_) => {
                ApiError::Authentication(error.to_string())
            }
        }
    }
}
