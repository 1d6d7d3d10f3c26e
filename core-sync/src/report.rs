//! Structured results handed back to callers of the orchestrator

use crate::run::SyncStats;
use crate::SyncError;
use core_directory::{ConnectionCounts, SyncRunRecord, SyncRunStatus};
use serde::Serialize;

/// Outcome of one connection's sync.
///
/// Failures inside the run (connector, timeout, cancellation) are reported
/// here with `status == Error` rather than as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub connection_id: String,
    pub connection_name: String,
    pub run_id: String,
    pub status: SyncRunStatus,
    pub users_processed: u64,
    pub devices_processed: u64,
    pub records_created: u64,
    pub records_updated: u64,
    pub records_failed: u64,
    pub conflicts_resolved: u64,
    pub duration_secs: u64,
    /// Why the run ended in `error`
    pub error: Option<String>,
    /// Per-record failures that did not stop the run
    pub record_errors: Vec<String>,
}

impl SyncResult {
    pub(crate) fn from_run(
        connection_id: &str,
        connection_name: &str,
        record: &SyncRunRecord,
        stats: &SyncStats,
    ) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            connection_name: connection_name.to_string(),
            run_id: record.id.clone(),
            status: record.status,
            users_processed: stats.users_processed(),
            devices_processed: stats.devices_processed(),
            records_created: stats.records_created(),
            records_updated: stats.records_updated(),
            records_failed: stats.records_failed(),
            conflicts_resolved: stats.conflicts_resolved(),
            duration_secs: record.duration_secs.map_or(0, |secs| secs.max(0) as u64),
            error: record.error_message.clone(),
            record_errors: stats.record_errors(),
        }
    }

    /// `success` and `partial` both count as a successful sync.
    pub fn is_success(&self) -> bool {
        matches!(self.status, SyncRunStatus::Success | SyncRunStatus::Partial)
    }
}

/// Rollup of one `sync_all_connections` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSyncReport {
    pub connections_processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub users_processed: u64,
    pub devices_processed: u64,
    pub duration_ms: u64,
    /// Stale runs closed before the batch started
    pub runs_reconciled: u64,
    /// One entry per connection that produced a run, ordered by connection name
    pub results: Vec<SyncResult>,
    /// `"<connection name>: <error>"` for every connection that failed
    pub errors: Vec<String>,
}

impl BatchSyncReport {
    pub(crate) fn absorb(&mut self, connection_name: &str, result: Result<SyncResult, SyncError>) {
        self.connections_processed += 1;

        match result {
            Ok(result) => {
                self.users_processed += result.users_processed;
                self.devices_processed += result.devices_processed;
                if result.is_success() {
                    self.successful += 1;
                } else {
                    self.failed += 1;
                    self.errors.push(format!(
                        "{}: {}",
                        connection_name,
                        result.error.as_deref().unwrap_or("unknown error")
                    ));
                }
                self.results.push(result);
            }
            Err(e) => {
                self.failed += 1;
                self.errors.push(format!("{}: {}", connection_name, e));
            }
        }
    }

    pub(crate) fn finish(&mut self) {
        self.results
            .sort_by(|a, b| a.connection_name.cmp(&b.connection_name));
        self.errors.sort();
    }

    pub fn result_for(&self, connection_name: &str) -> Option<&SyncResult> {
        self.results
            .iter()
            .find(|result| result.connection_name == connection_name)
    }
}

/// Fleet-wide health for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetHealthSummary {
    pub total_connections: i64,
    pub connected: i64,
    pub errored: i64,
    /// Connected share of all connections, 0-100 with two decimals
    pub health_percentage: f64,
    /// Newest first
    pub recent_runs: Vec<SyncRunRecord>,
}

impl FleetHealthSummary {
    pub(crate) fn new(counts: ConnectionCounts, recent_runs: Vec<SyncRunRecord>) -> Self {
        Self {
            total_connections: counts.total,
            connected: counts.connected,
            errored: counts.error,
            health_percentage: health_percentage(counts.connected, counts.total),
            recent_runs,
        }
    }
}

fn health_percentage(connected: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let percent = connected as f64 / total as f64 * 100.0;
    (percent * 100.0).round() / 100.0
}
