//! # Core Configuration Module
//!
//! Provides configuration management for the identity sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the injected bridges and every tunable of the request
//! client and the sync orchestrator. Validation is fail-fast: `build()` refuses
//! values that would stall or disable syncing.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - Transport used by every connector. With the
//!   `desktop-shims` feature a `ReqwestHttpClient` is injected when none is
//!   provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/idsync/directory.db")
//!     .max_concurrent_syncs(8)
//!     .sync_timeout(Duration::from_secs(30 * 60))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, RetryPolicy, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default interval between scheduled syncs of one connection.
pub const DEFAULT_SYNC_INTERVAL_MINUTES: i64 = 60;

/// Hard ceiling on pages fetched by a single paginated listing.
pub const DEFAULT_MAX_PAGES: usize = 100;

/// Orchestrator tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Interval used when a connection has none configured (or it is unparsable)
    pub default_interval_minutes: i64,
    /// Connections synced in parallel during a batch
    pub max_concurrent_syncs: usize,
    /// Deadline for one connection's sync
    pub sync_timeout: Duration,
    /// Age after which a run still marked running is considered abandoned
    pub stale_run_timeout: Duration,
    /// Number of runs returned by the fleet health summary
    pub recent_runs_limit: u32,
    /// Look-back window for the fleet health summary
    pub recent_runs_window: Duration,
    /// Period of the background scheduler
    pub scheduler_tick: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            default_interval_minutes: DEFAULT_SYNC_INTERVAL_MINUTES,
            max_concurrent_syncs: 4,
            sync_timeout: Duration::from_secs(60 * 60),
            stale_run_timeout: Duration::from_secs(2 * 60 * 60),
            recent_runs_limit: 10,
            recent_runs_window: Duration::from_secs(24 * 60 * 60),
            scheduler_tick: Duration::from_secs(60),
        }
    }
}

impl SyncSettings {
    pub fn validate(&self) -> Result<()> {
        if self.default_interval_minutes < 1 {
            return Err(Error::Config(
                "Default sync interval must be at least 1 minute".to_string(),
            ));
        }

        if self.max_concurrent_syncs == 0 {
            return Err(Error::Config(
                "max_concurrent_syncs must be at least 1".to_string(),
            ));
        }

        if self.sync_timeout.is_zero() {
            return Err(Error::Config(
                "Sync timeout must be greater than zero".to_string(),
            ));
        }

        if self.stale_run_timeout < self.sync_timeout {
            return Err(Error::Config(
                "Stale run timeout must not be shorter than the sync timeout, \
                 otherwise live runs would be reconciled as abandoned"
                    .to_string(),
            ));
        }

        if self.scheduler_tick.is_zero() {
            return Err(Error::Config(
                "Scheduler tick must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Core configuration for the identity sync core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file, `None` for an in-memory database
    pub database_path: Option<PathBuf>,

    /// HTTP transport shared by all connectors
    pub http_client: Arc<dyn HttpClient>,

    /// Wall-clock source for persisted timestamps
    pub clock: Arc<dyn Clock>,

    /// Retry, backoff and throttling policy of the request client
    pub retry_policy: RetryPolicy,

    /// Safety cap on pages per paginated listing
    pub max_pages: usize,

    /// Orchestrator tunables
    pub sync: SyncSettings,

    /// Broadcast buffer of the event bus
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("http_client", &"HttpClient { ... }")
            .field("clock", &"Clock { ... }")
            .field("retry_policy", &self.retry_policy)
            .field("max_pages", &self.max_pages)
            .field("sync", &self.sync)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        if self.retry_policy.max_attempts == 0 {
            return Err(Error::Config(
                "Retry policy must allow at least one attempt".to_string(),
            ));
        }

        if self.retry_policy.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        if self.max_pages == 0 {
            return Err(Error::Config("max_pages must be at least 1".to_string()));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be at least 1".to_string(),
            ));
        }

        self.sync.validate()
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::new().map_err(|e| Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: format!("Failed to create default ReqwestHttpClient: {}", e),
    })?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for connector traffic. \
                 Desktop/server: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Embedded hosts: inject an adapter with .http_client()."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    in_memory: bool,
    http_client: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
    retry_policy: Option<RetryPolicy>,
    max_pages: Option<usize>,
    sync: SyncSettings,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self.in_memory = false;
        self
    }

    /// Use an in-memory database instead of a file.
    pub fn in_memory(mut self) -> Self {
        self.database_path = None;
        self.in_memory = true;
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    /// Interval applied to connections without a usable interval of their own.
    ///
    /// Default: 60 minutes
    pub fn default_sync_interval_minutes(mut self, minutes: i64) -> Self {
        self.sync.default_interval_minutes = minutes;
        self
    }

    /// Maximum number of connections synced concurrently.
    ///
    /// Default: 4
    pub fn max_concurrent_syncs(mut self, limit: usize) -> Self {
        self.sync.max_concurrent_syncs = limit;
        self
    }

    /// Deadline for one connection's sync.
    ///
    /// Default: 1 hour
    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync.sync_timeout = timeout;
        self
    }

    /// Age after which a `running` run is reconciled as abandoned.
    ///
    /// Default: 2 hours
    pub fn stale_run_timeout(mut self, timeout: Duration) -> Self {
        self.sync.stale_run_timeout = timeout;
        self
    }

    /// Shape of the recent-run list in the fleet health summary.
    ///
    /// Default: 10 runs from the last 24 hours
    pub fn recent_runs(mut self, limit: u32, window: Duration) -> Self {
        self.sync.recent_runs_limit = limit;
        self.sync.recent_runs_window = window;
        self
    }

    pub fn scheduler_tick(mut self, tick: Duration) -> Self {
        self.sync.scheduler_tick = tick;
        self
    }

    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = settings;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Neither a database path nor `in_memory()` was given
    /// - No `HttpClient` is available
    /// - Any tunable is out of range
    pub fn build(self) -> Result<CoreConfig> {
        if self.database_path.is_none() && !self.in_memory {
            return Err(Error::Config(
                "Database path is required. Use .database_path() or .in_memory().".to_string(),
            ));
        }

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let config = CoreConfig {
            database_path: self.database_path,
            http_client,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            retry_policy: self.retry_policy.unwrap_or_default(),
            max_pages: self.max_pages.unwrap_or(DEFAULT_MAX_PAGES),
            sync: self.sync,
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, HttpRequest, HttpResponse};

    struct StubHttpClient;

    #[async_trait]
    impl HttpClient for StubHttpClient {
        async fn execute(&self, _request: HttpRequest) -> std::result::Result<HttpResponse, BridgeError> {
            Ok(HttpResponse::new(200, "{}"))
        }
    }

    fn builder() -> CoreConfigBuilder {
        CoreConfig::builder().http_client(Arc::new(StubHttpClient))
    }

    #[test]
    fn test_builder_requires_database_location() {
        let result = builder().build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("Database path")));
    }

    #[test]
    fn test_builder_with_defaults() {
        let config = builder().database_path("/tmp/directory.db").build().unwrap();

        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/directory.db")));
        assert_eq!(config.max_pages, 100);
        assert_eq!(config.retry_policy, RetryPolicy::default());
        assert_eq!(config.sync, SyncSettings::default());
        assert_eq!(config.sync.default_interval_minutes, 60);
        assert_eq!(config.event_buffer_size, 100);
    }

    #[test]
    fn test_in_memory_overrides_path() {
        let config = builder()
            .database_path("/tmp/directory.db")
            .in_memory()
            .build()
            .unwrap();
        assert!(config.database_path.is_none());
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_http_client() {
        let result = CoreConfig::builder().in_memory().build();
        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { capability, .. }) if capability == "HttpClient"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let result = builder()
            .in_memory()
            .retry_policy(RetryPolicy {
                max_attempts: 0,
                ..RetryPolicy::default()
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let result = builder().in_memory().max_concurrent_syncs(0).build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("max_concurrent_syncs")));
    }

    #[test]
    fn test_validate_rejects_stale_timeout_below_sync_timeout() {
        let result = builder()
            .in_memory()
            .sync_timeout(Duration::from_secs(600))
            .stale_run_timeout(Duration::from_secs(300))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_pages() {
        assert!(builder().in_memory().max_pages(0).build().is_err());
    }

    #[test]
    fn test_custom_sync_settings() {
        let config = builder()
            .in_memory()
            .default_sync_interval_minutes(15)
            .max_concurrent_syncs(2)
            .recent_runs(5, Duration::from_secs(3600))
            .build()
            .unwrap();

        assert_eq!(config.sync.default_interval_minutes, 15);
        assert_eq!(config.sync.max_concurrent_syncs, 2);
        assert_eq!(config.sync.recent_runs_limit, 5);
        assert_eq!(config.sync.recent_runs_window, Duration::from_secs(3600));
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = builder().in_memory().build().unwrap();
        let cloned = config.clone();
        assert_eq!(cloned.max_pages, config.max_pages);
        assert!(format!("{:?}", cloned).contains("HttpClient { ... }"));
    }
}
