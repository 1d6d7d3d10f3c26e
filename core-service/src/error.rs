use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Directory error: {0}")]
    Directory(#[from] core_directory::DirectoryError),

    #[error("Connector error: {0}")]
    Connector(#[from] core_connector::ApiError),

    #[error("Correlation error: {0}")]
    Correlation(#[from] core_correlation::CorrelationError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
