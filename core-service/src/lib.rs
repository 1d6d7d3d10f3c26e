//! Core service façade and bootstrap helpers.
//!
//! This crate wires the host-provided HTTP transport and clock into the
//! directory store, the provider registry, the correlation engine and the
//! sync orchestrator. Desktop and server hosts typically enable the
//! `desktop-shims` feature (which depends on `bridge-desktop`) and call
//! [`bootstrap_desktop`]; embedded hosts build a [`CoreConfig`] with their own
//! `HttpClient` and call [`CoreService::new`].

pub mod error;
pub mod registry;

pub use error::{CoreError, Result};
pub use registry::ProviderRegistry;

use std::sync::Arc;

use core_connector::{ConnectorFactory, HealthCheckResult};
use core_correlation::{CorrelationEngine, DeviceCorrelation, OrphanReport, UserCorrelation};
use core_directory::{
    create_pool, ApiConnectionConfig, ConnectionRepository, DatabaseConfig, DirectoryStore,
    SqliteDirectoryStore,
};
use core_runtime::events::{CoreEvent, EventBus};
use core_runtime::CoreConfig;
use core_sync::{
    parse_sync_kind, BatchSyncReport, FleetHealthSummary, SyncOrchestrator, SyncResult,
    SyncScheduler,
};
use serde_json::Value;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Handle to a running [`SyncScheduler`].
pub struct SchedulerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for the in-flight pass to finish.
    pub async fn stop(self) {
        self.token.cancel();
        self.task.await.ok();
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: CoreConfig,
    store: Arc<SqliteDirectoryStore>,
    engine: Arc<CorrelationEngine>,
    orchestrator: Arc<SyncOrchestrator>,
    event_bus: EventBus,
}

impl CoreService {
    /// Open the database and wire every component with the default
    /// [`ProviderRegistry`].
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be opened or migrated.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        let registry = Arc::new(ProviderRegistry::from_config(&config));
        Self::with_connectors(config, registry).await
    }

    /// Like [`CoreService::new`] with a custom connector factory.
    pub async fn with_connectors(
        config: CoreConfig,
        connectors: Arc<dyn ConnectorFactory>,
    ) -> Result<Self> {
        let database = match &config.database_path {
            Some(path) => DatabaseConfig::new(path),
            None => DatabaseConfig::in_memory(),
        };
        let pool = create_pool(database).await?;
        let store = Arc::new(SqliteDirectoryStore::new(pool));
        let event_bus = EventBus::new(config.event_buffer_size);

        let engine = Arc::new(
            CorrelationEngine::new(
                Arc::clone(&store) as Arc<dyn DirectoryStore>,
                Arc::clone(&config.clock),
            )
            .with_event_bus(event_bus.clone()),
        );

        let orchestrator = Arc::new(
            SyncOrchestrator::new(
                Arc::clone(&store) as Arc<dyn DirectoryStore>,
                connectors,
                Arc::clone(&engine),
                Arc::clone(&config.clock),
                config.sync.clone(),
            )
            .with_event_bus(event_bus.clone()),
        );

        info!(
            database = ?config.database_path,
            max_concurrent_syncs = config.sync.max_concurrent_syncs,
            "Core service initialized"
        );

        Ok(Self {
            config,
            store,
            engine,
            orchestrator,
            event_bus,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<SqliteDirectoryStore> {
        Arc::clone(&self.store)
    }

    pub fn engine(&self) -> Arc<CorrelationEngine> {
        Arc::clone(&self.engine)
    }

    pub fn orchestrator(&self) -> Arc<SyncOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// Receive sync, connection and correlation events.
    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    // ========================================================================
    // Connections
    // ========================================================================

    pub async fn add_connection(&self, connection: &ApiConnectionConfig) -> Result<()> {
        self.store.insert_connection(connection).await?;
        Ok(())
    }

    pub async fn list_connections(&self) -> Result<Vec<ApiConnectionConfig>> {
        Ok(self.store.list_connections().await?)
    }

    pub async fn test_connection(&self, connection_id: &str) -> Result<HealthCheckResult> {
        Ok(self.orchestrator.test_connection(connection_id).await?)
    }

    // ========================================================================
    // Sync
    // ========================================================================

    pub async fn sync_all_connections(&self, force_sync: bool) -> Result<BatchSyncReport> {
        Ok(self.orchestrator.sync_all_connections(force_sync).await?)
    }

    pub async fn sync_connection(&self, connection_id: &str) -> Result<SyncResult> {
        Ok(self.orchestrator.sync_connection(connection_id).await?)
    }

    /// Sync one connection with the run kind given as text (`full`,
    /// `incremental` or `manual`).
    pub async fn trigger_sync(&self, connection_id: &str, kind: &str) -> Result<SyncResult> {
        let kind = parse_sync_kind(kind)?;
        Ok(self
            .orchestrator
            .sync_connection_with_kind(connection_id, kind)
            .await?)
    }

    pub async fn cancel_sync(&self, connection_id: &str) -> bool {
        self.orchestrator.cancel_sync(connection_id).await
    }

    pub async fn get_sync_status(&self) -> Result<FleetHealthSummary> {
        Ok(self.orchestrator.get_sync_status().await?)
    }

    /// Start periodic syncing of due connections.
    pub fn start_scheduler(&self) -> SchedulerHandle {
        let scheduler = SyncScheduler::new(Arc::clone(&self.orchestrator));
        let token = scheduler.cancellation_token();
        SchedulerHandle {
            token,
            task: scheduler.spawn(),
        }
    }

    /// Cancel every in-flight sync.
    pub fn shutdown(&self) {
        info!("Core service shutting down");
        self.orchestrator.shutdown();
    }

    // ========================================================================
    // Correlation
    // ========================================================================

    /// Correlate one raw user record pushed by the host.
    pub async fn correlate_user(&self, raw: &Value, source_system: &str) -> Result<UserCorrelation> {
        Ok(self.engine.correlate_user(raw, source_system).await?)
    }

    /// Correlate one raw device record pushed by the host.
    pub async fn correlate_device(&self, raw: &Value, source_system: &str) -> Result<DeviceCorrelation> {
        Ok(self.engine.correlate_device(raw, source_system).await?)
    }

    pub async fn detect_orphaned_resources(&self) -> Result<OrphanReport> {
        Ok(self.engine.detect_orphaned_resources().await?)
    }
}

/// Convenience bootstrapper for desktop and server hosts.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// let core = core_service::bootstrap_desktop("idsync.db").await?;
/// let report = core.sync_all_connections(false).await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(database_path: impl Into<std::path::PathBuf>) -> Result<CoreService> {
    let config = CoreConfig::builder().database_path(database_path).build()?;
    CoreService::new(config).await
}
