//! # Core Directory
//!
//! The canonical directory: deduplicated identities, devices, external
//! accounts, the activity trail, configured connections and sync run history,
//! persisted in SQLite.
//!
//! The correlation engine and the sync orchestrator only see the
//! [`DirectoryStore`] trait; [`SqliteDirectoryStore`] is the shipped implementation.

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{DirectoryError, Result};
pub use models::{
    ActivityRecord, ApiConnectionConfig, CanonicalIdentity, ConnectionStatus, Device,
    DeviceStatus, ExternalAccount, IdentityStatus, ProviderKind, RateLimitWindow, SyncKind,
    SyncRunRecord, SyncRunStatus, DEFAULT_RATE_LIMIT_REQUESTS,
};
pub use repositories::{
    AccountRepository, ActivityRepository, ConnectionCounts, ConnectionRepository,
    DeviceRepository, DirectoryStore, IdentityFilter, IdentityRepository,
    IdentityResourceSummary, SqliteDirectoryStore, SyncRunRepository,
};
