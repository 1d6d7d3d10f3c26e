use core_directory::DirectoryError;
use thiserror::Error;

/// A source record that cannot be correlated as delivered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No {field} found in {kind} record from {source_system}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
        source_system: String,
    },

    #[error("{kind} record from {source_system} is not a JSON object")]
    NotAnObject {
        kind: &'static str,
        source_system: String,
    },
}

#[derive(Error, Debug)]
pub enum CorrelationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to correlate {record_hint} from {source_system}: {cause}")]
    Store {
        source_system: String,
        /// Email, device name or another short handle for the failing record
        record_hint: String,
        #[source]
        cause: DirectoryError,
    },
}

impl CorrelationError {
    pub(crate) fn store(source_system: &str, record_hint: &str, cause: DirectoryError) -> Self {
        CorrelationError::Store {
            source_system: source_system.to_string(),
            record_hint: record_hint.to_string(),
            cause,
        }
    }

    /// Validation failures mean the record was skipped, not that a write failed.
    pub fn is_validation(&self) -> bool {
        matches!(self, CorrelationError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, CorrelationError>;
