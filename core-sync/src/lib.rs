//! # Sync Module
//!
//! Pulls users and devices from configured connections and feeds them to the
//! correlation engine.
//!
//! ## Components
//!
//! - **Sync Run State Machine** (`run`): `running → success | partial | error`
//! - **Sync Orchestrator** (`orchestrator`): batch and single-connection syncs,
//!   connection tests, fleet health and stale-run reconciliation
//! - **Reports** (`report`): `SyncResult`, `BatchSyncReport`, `FleetHealthSummary`
//! - **Scheduler** (`scheduler`): periodic batch driver

pub mod error;
pub mod orchestrator;
pub mod report;
pub mod run;
pub mod scheduler;

pub use error::{Result, SyncError};
pub use orchestrator::SyncOrchestrator;
pub use report::{BatchSyncReport, FleetHealthSummary, SyncResult};
pub use run::{parse_run_status, parse_sync_kind, SyncRun, SyncStats};
pub use scheduler::SyncScheduler;
