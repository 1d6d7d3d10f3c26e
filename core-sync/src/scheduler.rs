//! Periodic driver for scheduled syncs

use crate::SyncOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runs `sync_all_connections(false)` every tick until cancelled.
///
/// A tick that fires while the previous batch is still running is skipped
/// rather than queued.
pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    tick: Duration,
    cancellation_token: CancellationToken,
}

impl SyncScheduler {
    /// Scheduler using the orchestrator's configured tick
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        let tick = orchestrator.settings().scheduler_tick;
        Self {
            orchestrator,
            tick,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Token that stops the loop once cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick_secs = self.tick.as_secs(), "Sync scheduler started");

        loop {
            tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                _ = interval.tick() => {
                    match self.orchestrator.sync_all_connections(false).await {
                        Ok(report) if report.connections_processed > 0 => info!(
                            successful = report.successful,
                            failed = report.failed,
                            "Scheduled sync pass finished"
                        ),
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Scheduled sync pass failed"),
                    }
                }
            }
        }

        info!("Sync scheduler stopped");
    }
}
