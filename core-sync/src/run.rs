//! # Sync Run State Machine
//!
//! Wraps a [`SyncRunRecord`] and only lets it move along valid transitions:
//!
//! ```text
//! running → success
//!    │   → partial   (some records failed to correlate)
//!    └──→ error
//! ```
//!
//! The record is persisted in `running` state before any network activity,
//! so a crash mid-run stays observable until
//! [`SyncOrchestrator::reconcile_stale_runs`](crate::SyncOrchestrator::reconcile_stale_runs)
//! closes it.

use crate::{Result, SyncError};
use core_correlation::CorrelationOutcome;
use core_directory::{SyncKind, SyncRunRecord, SyncRunStatus};
use serde::Serialize;
use std::str::FromStr;

// ============================================================================
// Run Statistics
// ============================================================================

/// Correlation totals for one run, split by record type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub users: CorrelationOutcome,
    pub devices: CorrelationOutcome,
}

impl SyncStats {
    pub fn users_processed(&self) -> u64 {
        self.users.processed
    }

    pub fn devices_processed(&self) -> u64 {
        self.devices.processed
    }

    /// Records correlated successfully, users plus devices
    pub fn records_processed(&self) -> u64 {
        self.users.processed + self.devices.processed
    }

    pub fn records_created(&self) -> u64 {
        self.users.created + self.devices.created
    }

    pub fn records_updated(&self) -> u64 {
        self.users.updated + self.devices.updated
    }

    pub fn records_failed(&self) -> u64 {
        self.users.failed + self.devices.failed
    }

    pub fn conflicts_resolved(&self) -> u64 {
        self.users.conflicts_resolved + self.devices.conflicts_resolved
    }

    pub fn record_errors(&self) -> Vec<String> {
        self.users
            .errors
            .iter()
            .chain(self.devices.errors.iter())
            .cloned()
            .collect()
    }
}

// ============================================================================
// Sync Run
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRun {
    record: SyncRunRecord,
}

impl SyncRun {
    /// A new run in `running` state
    pub fn start(connection_id: impl Into<String>, kind: SyncKind, now: i64) -> Self {
        Self {
            record: SyncRunRecord::running(connection_id, kind, now),
        }
    }

    /// Pick up a persisted run, e.g. to close one left behind by a crash.
    pub fn resume(record: SyncRunRecord) -> Self {
        Self { record }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn status(&self) -> SyncRunStatus {
        self.record.status
    }

    pub fn record(&self) -> &SyncRunRecord {
        &self.record
    }

    /// Finish the run as `success`, or `partial` when any record failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is not `running`
    pub fn complete(mut self, stats: &SyncStats, now: i64) -> Result<SyncRunRecord> {
        let status = if stats.records_failed() > 0 {
            SyncRunStatus::Partial
        } else {
            SyncRunStatus::Success
        };
        self.validate_transition(status)?;

        self.apply_counts(stats);
        self.close(status, now);
        Ok(self.record)
    }

    /// Finish the run as `error`, keeping whatever was counted before the failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is not `running`
    pub fn fail(mut self, message: impl Into<String>, stats: &SyncStats, now: i64) -> Result<SyncRunRecord> {
        self.validate_transition(SyncRunStatus::Error)?;

        self.apply_counts(stats);
        self.record.error_message = Some(message.into());
        self.close(SyncRunStatus::Error, now);
        Ok(self.record)
    }

    fn apply_counts(&mut self, stats: &SyncStats) {
        self.record.records_processed = to_i64(stats.records_processed());
        self.record.records_created = to_i64(stats.records_created());
        self.record.records_updated = to_i64(stats.records_updated());
        self.record.records_failed = to_i64(stats.records_failed());
    }

    fn close(&mut self, status: SyncRunStatus, now: i64) {
        self.record.status = status;
        self.record.completed_at = Some(now);
        self.record.duration_secs = Some((now - self.record.started_at).max(0));
    }

    fn validate_transition(&self, to: SyncRunStatus) -> Result<()> {
        let valid = match (self.record.status, to) {
            (SyncRunStatus::Running, SyncRunStatus::Success) => true,
            (SyncRunStatus::Running, SyncRunStatus::Partial) => true,
            (SyncRunStatus::Running, SyncRunStatus::Error) => true,

            // Terminal states cannot transition
            (SyncRunStatus::Success | SyncRunStatus::Partial | SyncRunStatus::Error, _) => false,

            (SyncRunStatus::Running, SyncRunStatus::Running) => false,
        };

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.record.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.record.status.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a sync kind as given by an operator ("full", "manual", ...).
///
/// # Errors
///
/// Returns [`SyncError::InvalidKind`] for unknown values
pub fn parse_sync_kind(s: &str) -> Result<SyncKind> {
    SyncKind::from_str(s).map_err(|_| SyncError::InvalidKind(s.to_string()))
}

/// # Errors
///
/// Returns [`SyncError::InvalidStatus`] for unknown values
pub fn parse_run_status(s: &str) -> Result<SyncRunStatus> {
    SyncRunStatus::from_str(s).map_err(|_| SyncError::InvalidStatus(s.to_string()))
}
