use core_connector::ApiError;
use core_directory::DirectoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("API connection {connection_id} not found")]
    ConnectionNotFound { connection_id: String },

    #[error("Connector for {0} not implemented yet")]
    NotImplemented(String),

    #[error("Sync already in progress for connection {connection_id}")]
    SyncInProgress { connection_id: String },

    #[error(transparent)]
    Api(ApiError),

    #[error("Database error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Sync timeout after {0} seconds")]
    Timeout(u64),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Invalid sync status: {0}")]
    InvalidStatus(String),

    #[error("Invalid sync kind: {0}")]
    InvalidKind(String),
}

impl From<ApiError> for SyncError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::UnsupportedProvider(provider) => SyncError::NotImplemented(provider),
            other => SyncError::Api(other),
        }
    }
}

impl SyncError {
    /// Whether a later scheduled attempt may succeed without anyone
    /// touching the connection's configuration.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::Api(api) => !matches!(
                api,
                ApiError::Authentication(_) | ApiError::Credentials(_) | ApiError::InvalidUrl(_)
            ),
            SyncError::Directory(_) | SyncError::Timeout(_) | SyncError::SyncInProgress { .. } => true,
            SyncError::Cancelled => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
