//! # Sync Orchestrator
//!
//! Drives configured connections through their connector and the
//! correlation engine, and records what happened.
//!
//! ## Workflow
//!
//! For one connection:
//! 1. Load the connection; a missing one fails fast
//! 2. Persist a `running` [`SyncRunRecord`] before any network activity
//! 3. Mark the connection connected and stamp the health check
//! 4. Build a connector for the provider kind
//! 5. Fetch users and correlate them one by one, if supported
//! 6. Fetch devices and correlate them one by one, if supported
//! 7. Finalize the run and schedule `next_sync = now + interval`
//!
//! Anything failing in steps 4-6 (including the per-connection deadline)
//! finalizes the run as `error`, marks the connection `Error` and is returned
//! as a failed [`SyncResult`]. A cancelled run is finalized the same way but
//! leaves the connection's health alone. Records that fail validation or
//! correlation are counted and skipped.
//!
//! Across connections, [`SyncOrchestrator::sync_all_connections`] runs up to
//! `max_concurrent_syncs` syncs at once. A failing connection never stops the
//! batch.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let orchestrator = SyncOrchestrator::new(store, connectors, engine, clock, SyncSettings::default())
//!     .with_event_bus(event_bus);
//!
//! let report = orchestrator.sync_all_connections(false).await?;
//! println!("{} of {} connections synced", report.successful, report.connections_processed);
//! ```

use crate::report::{BatchSyncReport, FleetHealthSummary, SyncResult};
use crate::run::{SyncRun, SyncStats};
use crate::{Result, SyncError};
use bridge_traits::time::Clock;
use core_connector::{Connector, ConnectorFactory, HealthCheckResult};
use core_correlation::CorrelationEngine;
use core_directory::{
    ApiConnectionConfig, ConnectionStatus, DirectoryStore, SyncKind, SyncRunRecord,
};
use core_runtime::config::SyncSettings;
use core_runtime::events::{ConnectionEvent, CoreEvent, EventBus, SyncEvent};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const ABANDONED_RUN_MESSAGE: &str = "Sync run abandoned";

pub struct SyncOrchestrator {
    store: Arc<dyn DirectoryStore>,
    connectors: Arc<dyn ConnectorFactory>,
    engine: Arc<CorrelationEngine>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
    event_bus: Option<EventBus>,

    /// Parent of every run's cancellation token
    shutdown: CancellationToken,

    /// Runs in flight, by connection id
    active_syncs: ActiveSyncs,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        connectors: Arc<dyn ConnectorFactory>,
        engine: Arc<CorrelationEngine>,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            connectors,
            engine,
            clock,
            settings,
            event_bus: None,
            shutdown: CancellationToken::new(),
            active_syncs: ActiveSyncs::default(),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    // =========================================================================
    // Batch
    // =========================================================================

    /// Sync every enabled connection (`force_sync`) or only the due ones.
    ///
    /// Stale runs are reconciled first. Per-connection failures end up in the
    /// report, never in the `Err` branch.
    ///
    /// # Errors
    ///
    /// Returns an error only if the candidate connections cannot be listed.
    #[instrument(skip(self))]
    pub async fn sync_all_connections(&self, force_sync: bool) -> Result<BatchSyncReport> {
        let started = Instant::now();
        let mut report = BatchSyncReport::default();

        match self.reconcile_stale_runs().await {
            Ok(closed) => report.runs_reconciled = closed,
            Err(e) => warn!(error = %e, "Failed to reconcile stale sync runs"),
        }

        let connections = self.connections_to_sync(force_sync).await?;
        info!(
            count = connections.len(),
            force_sync,
            "Starting sync of {} connections",
            connections.len()
        );

        let outcomes: Vec<(String, Result<SyncResult>)> = stream::iter(connections)
            .map(|connection| async move {
                let result = self
                    .sync_connection_with_kind(&connection.id, SyncKind::Full)
                    .await;
                (connection.name, result)
            })
            .buffer_unordered(self.settings.max_concurrent_syncs.max(1))
            .collect()
            .await;

        for (name, result) in outcomes {
            if let Err(e) = &result {
                error!(connection = %name, error = %e, "Connection sync could not run");
            }
            report.absorb(&name, result);
        }
        report.finish();
        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            successful = report.successful,
            failed = report.failed,
            users = report.users_processed,
            devices = report.devices_processed,
            duration_ms = report.duration_ms,
            "Batch sync finished"
        );

        Ok(report)
    }

    async fn connections_to_sync(&self, force_sync: bool) -> Result<Vec<ApiConnectionConfig>> {
        if force_sync {
            let connections = self.store.list_connections().await?;
            Ok(connections
                .into_iter()
                .filter(|connection| connection.sync_enabled)
                .collect())
        } else {
            let now = self.clock.unix_timestamp();
            Ok(self.store.list_due_connections(now).await?)
        }
    }

    // =========================================================================
    // Single Connection
    // =========================================================================

    /// Manually triggered sync of one connection.
    ///
    /// # Errors
    ///
    /// See [`Self::sync_connection_with_kind`].
    pub async fn sync_connection(&self, connection_id: &str) -> Result<SyncResult> {
        self.sync_connection_with_kind(connection_id, SyncKind::Manual)
            .await
    }

    /// Sync one connection, recording the run under `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConnectionNotFound`] for unknown ids,
    /// [`SyncError::SyncInProgress`] when the connection is already syncing,
    /// and [`SyncError::Directory`] when the run bookkeeping itself cannot be
    /// persisted. Failures of the sync work are returned as a
    /// [`SyncResult`] with status `error`.
    #[instrument(skip(self))]
    pub async fn sync_connection_with_kind(&self, connection_id: &str, kind: SyncKind) -> Result<SyncResult> {
        let connection = self
            .store
            .find_connection(connection_id)
            .await?
            .ok_or_else(|| SyncError::ConnectionNotFound {
                connection_id: connection_id.to_string(),
            })?;

        let active = self.active_syncs.register(connection_id, &self.shutdown)?;
        self.run_sync(connection, kind, active.token()).await
    }

    /// Cancel an in-flight sync of one connection.
    ///
    /// Returns `false` when the connection is not syncing.
    pub async fn cancel_sync(&self, connection_id: &str) -> bool {
        match self.active_syncs.lock().get(connection_id) {
            Some(token) => {
                info!(connection_id, "Cancelling sync");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight and future sync of this orchestrator.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn is_sync_active(&self, connection_id: &str) -> bool {
        self.active_syncs.lock().contains_key(connection_id)
    }

    async fn run_sync(
        &self,
        mut connection: ApiConnectionConfig,
        kind: SyncKind,
        token: &CancellationToken,
    ) -> Result<SyncResult> {
        let now = self.clock.unix_timestamp();
        let run = SyncRun::start(&connection.id, kind, now);
        self.store.insert_sync_run(run.record()).await?;

        self.emit(SyncEvent::Started {
            run_id: run.id().to_string(),
            connection_id: connection.id.clone(),
            provider: connection.provider.as_str().to_string(),
            kind: kind.as_str().to_string(),
        });

        connection.status = ConnectionStatus::Connected;
        connection.health_check_message = None;
        connection.last_health_check = Some(now);
        connection.updated_at = now;
        self.store.update_connection(&connection).await?;

        let mut stats = SyncStats::default();
        let outcome = match timeout(
            self.settings.sync_timeout,
            self.execute(&connection, token, &mut stats),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(SyncError::Timeout(self.settings.sync_timeout.as_secs())),
        };

        match outcome {
            Ok(()) => self.finish_success(connection, run, stats).await,
            Err(e) => self.finish_failure(connection, run, stats, e).await,
        }
    }

    async fn execute(
        &self,
        connection: &ApiConnectionConfig,
        token: &CancellationToken,
        stats: &mut SyncStats,
    ) -> Result<()> {
        let connector = self.connectors.create(connection).await?;
        let source_system = connection.name.as_str();

        if connection.supports_users {
            let records = self.fetch(token, connector.as_ref(), RecordKind::Users).await?;
            info!(count = records.len(), source = source_system, "Fetched users");

            for record in &records {
                if token.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                let result = self.engine.correlate_user(record, source_system).await;
                if let Err(e) = &result {
                    warn!(source = source_system, error = %e, "Skipping user record");
                }
                stats.users.record_user(&result);
            }
        }

        if connection.supports_devices {
            let records = self.fetch(token, connector.as_ref(), RecordKind::Devices).await?;
            info!(count = records.len(), source = source_system, "Fetched devices");

            for record in &records {
                if token.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                let result = self.engine.correlate_device(record, source_system).await;
                if let Err(e) = &result {
                    warn!(source = source_system, error = %e, "Skipping device record");
                }
                stats.devices.record_device(&result);
            }
        }

        Ok(())
    }

    async fn fetch(&self, token: &CancellationToken, connector: &dyn Connector, kind: RecordKind) -> Result<Vec<Value>> {
        let fetch = async {
            match kind {
                RecordKind::Users => connector.fetch_users().await,
                RecordKind::Devices => connector.fetch_devices().await,
            }
        };

        tokio::select! {
            _ = token.cancelled() => Err(SyncError::Cancelled),
            records = fetch => Ok(records?),
        }
    }

    async fn finish_success(
        &self,
        mut connection: ApiConnectionConfig,
        run: SyncRun,
        stats: SyncStats,
    ) -> Result<SyncResult> {
        let now = self.clock.unix_timestamp();
        let record = run.complete(&stats, now)?;
        self.store.update_sync_run(&record).await?;

        let interval = connection.interval_minutes(self.settings.default_interval_minutes);
        connection.last_sync = Some(now);
        connection.next_sync = Some(next_sync_at(now, interval, self.settings.default_interval_minutes));
        connection.updated_at = now;
        self.store.update_connection(&connection).await?;

        info!(
            run_id = %record.id,
            status = %record.status,
            processed = record.records_processed,
            failed = record.records_failed,
            next_sync = connection.next_sync,
            "Sync of {} finished",
            connection.name
        );

        self.emit(SyncEvent::Completed {
            run_id: record.id.clone(),
            connection_id: connection.id.clone(),
            records_processed: stats.records_processed(),
            records_failed: stats.records_failed(),
            duration_secs: record.duration_secs.map_or(0, |secs| secs.max(0) as u64),
        });
        self.emit_health(&connection);

        Ok(SyncResult::from_run(&connection.id, &connection.name, &record, &stats))
    }

    async fn finish_failure(
        &self,
        mut connection: ApiConnectionConfig,
        run: SyncRun,
        stats: SyncStats,
        cause: SyncError,
    ) -> Result<SyncResult> {
        let now = self.clock.unix_timestamp();
        let message = cause.to_string();
        let record = run.fail(message.clone(), &stats, now)?;
        self.store.update_sync_run(&record).await?;

        if matches!(cause, SyncError::Cancelled) {
            warn!(run_id = %record.id, "Sync of {} cancelled", connection.name);
            self.emit(SyncEvent::Cancelled {
                run_id: record.id.clone(),
                connection_id: connection.id.clone(),
                records_processed: stats.records_processed(),
            });
        } else {
            error!(run_id = %record.id, error = %message, "Sync of {} failed", connection.name);

            connection.status = ConnectionStatus::Error;
            connection.health_check_message = Some(format!("Sync failed: {}", message));
            connection.updated_at = now;
            self.store.update_connection(&connection).await?;

            self.emit(SyncEvent::Failed {
                run_id: record.id.clone(),
                connection_id: connection.id.clone(),
                message,
                recoverable: cause.is_recoverable(),
            });
            self.emit_health(&connection);
        }

        Ok(SyncResult::from_run(&connection.id, &connection.name, &record, &stats))
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Probe one connection and record its health.
    ///
    /// Connector failures are folded into a failed [`HealthCheckResult`];
    /// sync schedule and run history are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConnectionNotFound`] for unknown ids and
    /// [`SyncError::Directory`] if the health update cannot be persisted.
    #[instrument(skip(self))]
    pub async fn test_connection(&self, connection_id: &str) -> Result<HealthCheckResult> {
        let mut connection = self
            .store
            .find_connection(connection_id)
            .await?
            .ok_or_else(|| SyncError::ConnectionNotFound {
                connection_id: connection_id.to_string(),
            })?;

        let probe = async {
            let connector = self.connectors.create(&connection).await?;
            Ok::<_, SyncError>(connector.test_connection().await?)
        };

        let result = match probe.await {
            Ok(result) if result.success => {
                connection.status = ConnectionStatus::Connected;
                connection.health_check_message = Some("Connection test successful".to_string());
                result
            }
            Ok(result) => {
                connection.status = ConnectionStatus::Error;
                connection.health_check_message = Some(result.message.clone());
                result
            }
            Err(e) => {
                let message = format!("Connection test failed: {}", e);
                connection.status = ConnectionStatus::Error;
                connection.health_check_message = Some(message.clone());
                HealthCheckResult::failure(message)
            }
        };

        let now = self.clock.unix_timestamp();
        connection.last_health_check = Some(now);
        connection.updated_at = now;
        self.store.update_connection(&connection).await?;
        self.emit_health(&connection);

        debug!(success = result.success, "Connection test of {} done", connection.name);
        Ok(result)
    }

    /// Connection counts plus the most recent runs inside the configured window.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Directory`] if a query fails.
    pub async fn get_sync_status(&self) -> Result<FleetHealthSummary> {
        let counts = self.store.count_connections().await?;
        let since = self.clock.unix_timestamp() - duration_secs(self.settings.recent_runs_window);
        let recent = self
            .store
            .list_recent_sync_runs(since, self.settings.recent_runs_limit)
            .await?;

        Ok(FleetHealthSummary::new(counts, recent))
    }

    /// Close runs left `running` for longer than the stale-run timeout.
    ///
    /// Returns the number of runs closed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Directory`] if the sweep cannot read or write runs.
    pub async fn reconcile_stale_runs(&self) -> Result<u64> {
        let now = self.clock.unix_timestamp();
        let cutoff = now - duration_secs(self.settings.stale_run_timeout);
        let stale = self.store.list_stale_sync_runs(cutoff).await?;

        let active: Vec<String> = self.active_syncs.lock().keys().cloned().collect();
        let mut closed = 0;

        for record in stale {
            if active.contains(&record.connection_id) {
                continue;
            }
            let record: SyncRunRecord =
                SyncRun::resume(record).fail(ABANDONED_RUN_MESSAGE, &SyncStats::default(), now)?;
            self.store.update_sync_run(&record).await?;
            warn!(run_id = %record.id, connection_id = %record.connection_id, "Closed abandoned sync run");
            closed += 1;
        }

        Ok(closed)
    }

    // =========================================================================
    // Events
    // =========================================================================

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Sync(event)).ok();
        }
    }

    fn emit_health(&self, connection: &ApiConnectionConfig) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Connection(ConnectionEvent::HealthChanged {
                connection_id: connection.id.clone(),
                status: connection.status.as_str().to_string(),
                message: connection.health_check_message.clone(),
            }))
            .ok();
        }
    }
}

// =========================================================================
// Active Runs
// =========================================================================

/// Cancellation tokens of the runs in flight, by connection id.
///
/// Only touched for short map operations, never across an await.
#[derive(Debug, Default)]
struct ActiveSyncs {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl ActiveSyncs {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, connection_id: &str, parent: &CancellationToken) -> Result<ActiveSync<'_>> {
        let mut tokens = self.lock();
        if tokens.contains_key(connection_id) {
            return Err(SyncError::SyncInProgress {
                connection_id: connection_id.to_string(),
            });
        }

        let token = parent.child_token();
        tokens.insert(connection_id.to_string(), token.clone());
        Ok(ActiveSync {
            syncs: self,
            connection_id: connection_id.to_string(),
            token,
        })
    }
}

/// Registration of one in-flight run; dropping it frees the connection,
/// including when the caller abandons the sync future.
struct ActiveSync<'a> {
    syncs: &'a ActiveSyncs,
    connection_id: String,
    token: CancellationToken,
}

impl ActiveSync<'_> {
    fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for ActiveSync<'_> {
    fn drop(&mut self) {
        self.syncs.lock().remove(&self.connection_id);
    }
}

#[derive(Debug, Clone, Copy)]
enum RecordKind {
    Users,
    Devices,
}

/// `now` plus `interval_minutes`, falling back to `default_minutes` when the
/// configured interval does not fit in a timestamp.
fn next_sync_at(now: i64, interval_minutes: i64, default_minutes: i64) -> i64 {
    interval_minutes
        .checked_mul(60)
        .and_then(|secs| now.checked_add(secs))
        .unwrap_or_else(|| {
            warn!(interval_minutes, "Sync interval out of range, using the default");
            now.saturating_add(default_minutes.saturating_mul(60))
        })
}

fn duration_secs(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_sync_at() {
        assert_eq!(next_sync_at(1_000, 30, 60), 1_000 + 30 * 60);
        assert_eq!(next_sync_at(1_000, i64::MAX, 60), 1_000 + 60 * 60);
        assert_eq!(next_sync_at(i64::MAX - 10, 1, 60), i64::MAX);
    }

    #[test]
    fn test_dropping_registration_frees_connection() {
        let syncs = ActiveSyncs::default();
        let parent = CancellationToken::new();

        let first = syncs.register("conn-1", &parent).unwrap();
        assert!(matches!(
            syncs.register("conn-1", &parent),
            Err(SyncError::SyncInProgress { .. })
        ));

        drop(first);
        assert!(syncs.lock().is_empty());
        assert!(syncs.register("conn-1", &parent).is_ok());
    }
}
