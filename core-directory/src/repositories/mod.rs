//! # Directory Store
//!
//! Repository traits for every entity the sync core reads or writes, and the
//! SQLite implementation shared by all of them.
//!
//! ## Architecture
//!
//! - One trait per entity (`IdentityRepository`, `DeviceRepository`, ...)
//! - [`DirectoryStore`] is the union of all of them; the correlation engine and
//!   the orchestrator hold an `Arc<dyn DirectoryStore>`
//! - [`SqliteDirectoryStore`] implements every trait over one `SqlitePool`
//!
//! Writes are single statements; the store never holds a transaction across
//! calls, so callers serialize conflicting updates themselves.

pub mod account;
pub mod activity;
pub mod connection;
pub mod device;
pub mod identity;
pub mod sync_run;

pub use account::AccountRepository;
pub use activity::ActivityRepository;
pub use connection::{ConnectionCounts, ConnectionRepository};
pub use device::DeviceRepository;
pub use identity::{IdentityFilter, IdentityRepository, IdentityResourceSummary};
pub use sync_run::SyncRunRepository;

use sqlx::SqlitePool;

/// Every persistence operation the sync core needs.
pub trait DirectoryStore:
    IdentityRepository
    + DeviceRepository
    + AccountRepository
    + ActivityRepository
    + ConnectionRepository
    + SyncRunRepository
{
}

impl<T> DirectoryStore for T where
    T: IdentityRepository
        + DeviceRepository
        + AccountRepository
        + ActivityRepository
        + ConnectionRepository
        + SyncRunRepository
{
}

/// SQLite implementation of every directory repository
#[derive(Clone)]
pub struct SqliteDirectoryStore {
    pool: SqlitePool,
}

impl SqliteDirectoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Escape `LIKE` wildcards so user text matches literally (used with `ESCAPE '\'`).
pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("Jane"), "Jane");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
