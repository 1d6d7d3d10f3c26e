//! Per-record results and their running totals

use crate::error::CorrelationError;
use core_directory::{CanonicalIdentity, Device};
use serde::Serialize;

/// A user record that made it into the directory.
#[derive(Debug, Clone)]
pub struct UserCorrelation {
    pub identity: CanonicalIdentity,
    pub created: bool,
    /// Fields changed by conflict resolution
    pub conflicts_resolved: u32,
}

/// A device record that made it into the directory.
#[derive(Debug, Clone)]
pub struct DeviceCorrelation {
    pub device: Device,
    pub created: bool,
    pub conflicts_resolved: u32,
}

impl DeviceCorrelation {
    pub fn owner_id(&self) -> Option<&str> {
        self.device.owner_id.as_deref()
    }
}

/// Counts folded over a batch of correlations.
///
/// `processed` counts records that were correlated; records that failed
/// validation or a write are counted in `failed` with their message in
/// `errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorrelationOutcome {
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub conflicts_resolved: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

impl CorrelationOutcome {
    pub fn record_user(&mut self, result: &Result<UserCorrelation, CorrelationError>) {
        match result {
            Ok(user) => self.record_success(user.created, user.conflicts_resolved),
            Err(e) => self.record_failure(e),
        }
    }

    pub fn record_device(&mut self, result: &Result<DeviceCorrelation, CorrelationError>) {
        match result {
            Ok(device) => self.record_success(device.created, device.conflicts_resolved),
            Err(e) => self.record_failure(e),
        }
    }

    fn record_success(&mut self, created: bool, conflicts_resolved: u32) {
        self.processed += 1;
        if created {
            self.created += 1;
        } else {
            self.updated += 1;
        }
        self.conflicts_resolved += u64::from(conflicts_resolved);
    }

    fn record_failure(&mut self, error: &CorrelationError) {
        self.failed += 1;
        self.errors.push(error.to_string());
    }

    pub fn merge(&mut self, other: CorrelationOutcome) {
        self.processed += other.processed;
        self.created += other.created;
        self.updated += other.updated;
        self.conflicts_resolved += other.conflicts_resolved;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
