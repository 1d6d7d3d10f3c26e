//! # Event Bus System
//!
//! Typed, broadcast-based notifications for the sync core using
//! `tokio::sync::broadcast`. The orchestrator and the correlation engine
//! publish; hosts subscribe to drive dashboards, alerting or audit trails.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐  emit   ┌───────────┐
//! │ Sync Orchestrator ├────────>│           │  subscribe  ┌────────────┐
//! └───────────────────┘         │ EventBus  ├────────────>│ Subscriber │
//! ┌───────────────────┐  emit   │ (broadcast│             └────────────┘
//! │ Correlation Engine├────────>│  channel) │
//! └───────────────────┘         └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::Started {
//!         run_id: "run-1".to_string(),
//!         connection_id: "okta-prod".to_string(),
//!         provider: "OKTA".to_string(),
//!         kind: "full".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Sync started");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events and may keep
//!   receiving.
//! - **`RecvError::Closed`**: every sender is gone; treat it as shutdown.
//!
//! Publishers ignore send errors (`emit(..).ok()`): having no subscriber is a
//! normal state.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sync run lifecycle
    Sync(SyncEvent),
    /// Connection health changes
    Connection(ConnectionEvent),
    /// Directory changes made by the correlation engine
    Correlation(CorrelationEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Connection(e) => e.description(),
            CoreEvent::Correlation(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Connection(ConnectionEvent::HealthChanged { status, .. })
                if status == "error" =>
            {
                EventSeverity::Error
            }
            CoreEvent::Sync(SyncEvent::Cancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed {
                records_failed, ..
            }) if *records_failed > 0 => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Connection(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Lifecycle of a single connection's sync run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    Started {
        run_id: String,
        connection_id: String,
        /// Provider kind as stored on the connection (e.g. "OKTA")
        provider: String,
        /// "full", "incremental" or "manual"
        kind: String,
    },
    /// Run finished; `records_failed > 0` means the run ended `partial`.
    Completed {
        run_id: String,
        connection_id: String,
        records_processed: u64,
        records_failed: u64,
        duration_secs: u64,
    },
    Failed {
        run_id: String,
        connection_id: String,
        message: String,
        /// Whether a later scheduled attempt may succeed
        recoverable: bool,
    },
    Cancelled {
        run_id: String,
        connection_id: String,
        records_processed: u64,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::Cancelled { .. } => "Sync cancelled",
        }
    }
}

// ============================================================================
// Connection Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ConnectionEvent {
    /// A connection's health status was rewritten after a test or a sync.
    HealthChanged {
        connection_id: String,
        /// Lowercase connection status ("connected", "error", ...)
        status: String,
        message: Option<String>,
    },
}

impl ConnectionEvent {
    fn description(&self) -> &str {
        match self {
            ConnectionEvent::HealthChanged { .. } => "Connection health changed",
        }
    }
}

// ============================================================================
// Correlation Events
// ============================================================================

/// Directory changes produced while correlating source records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CorrelationEvent {
    IdentityCreated {
        identity_id: String,
        source_system: String,
    },
    DeviceCreated {
        device_id: String,
        source_system: String,
    },
    /// A device gained an owner through inference.
    OwnerInferred {
        device_id: String,
        identity_id: String,
    },
}

impl CorrelationEvent {
    fn description(&self) -> &str {
        match self {
            CorrelationEvent::IdentityCreated { .. } => "Identity created",
            CorrelationEvent::DeviceCreated { .. } => "Device created",
            CorrelationEvent::OwnerInferred { .. } => "Device owner inferred",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus clones the sender; every `subscribe()` creates an
/// independent receiver that sees events emitted after the call.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls behind by more than `capacity` events receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventSeverity, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let alerts = EventStream::new(event_bus.subscribe())
///     .filter(|event| event.severity() >= EventSeverity::Warning);
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn started(connection_id: &str) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::Started {
            run_id: format!("run-{}", connection_id),
            connection_id: connection_id.to_string(),
            provider: "OKTA".to_string(),
            kind: "full".to_string(),
        })
    }

    fn completed(records_failed: u64) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::Completed {
            run_id: "run-1".to_string(),
            connection_id: "okta-prod".to_string(),
            records_processed: 5,
            records_failed,
            duration_secs: 3,
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(started("okta-prod")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = started("graph-main");
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Correlation(_)));

        bus.emit(started("okta-prod")).ok();

        let inferred = CoreEvent::Correlation(CorrelationEvent::OwnerInferred {
            device_id: "dev-1".to_string(),
            identity_id: "id-1".to_string(),
        });
        bus.emit(inferred.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), inferred);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(started(&format!("conn-{}", i))).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Sync(SyncEvent::Failed {
            run_id: "run-1".to_string(),
            connection_id: "okta-prod".to_string(),
            message: "Sync failed: authentication failed".to_string(),
            recoverable: false,
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        assert_eq!(completed(0).severity(), EventSeverity::Info);
        assert_eq!(completed(2).severity(), EventSeverity::Warning);

        let unhealthy = CoreEvent::Connection(ConnectionEvent::HealthChanged {
            connection_id: "okta-prod".to_string(),
            status: "error".to_string(),
            message: Some("Connection test failed: timeout".to_string()),
        });
        assert_eq!(unhealthy.severity(), EventSeverity::Error);

        assert_eq!(started("okta-prod").severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_description() {
        assert_eq!(started("okta-prod").description(), "Sync started");

        let created = CoreEvent::Correlation(CorrelationEvent::DeviceCreated {
            device_id: "dev-1".to_string(),
            source_system: "Microsoft Intune".to_string(),
        });
        assert_eq!(created.description(), "Device created");
    }

    #[tokio::test]
    async fn test_concurrent_publishers() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe();

        let bus1 = bus.clone();
        let bus2 = bus.clone();

        let handle1 = tokio::spawn(async move {
            for i in 0..10 {
                bus1.emit(started(&format!("conn-{}", i))).ok();
            }
        });

        let handle2 = tokio::spawn(async move {
            for i in 0..10 {
                bus2.emit(CoreEvent::Correlation(CorrelationEvent::IdentityCreated {
                    identity_id: format!("id-{}", i),
                    source_system: "Okta".to_string(),
                }))
                .ok();
            }
        });

        handle1.await.ok();
        handle2.await.ok();

        let mut count = 0;
        while sub.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 20);
    }

    #[test]
    fn test_event_serialization_shape() {
        let json = serde_json::to_value(completed(1)).unwrap();

        assert_eq!(json["type"], "Sync");
        assert_eq!(json["payload"]["event"], "Completed");
        assert_eq!(json["payload"]["records_failed"], 1);

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, completed(1));
    }

    #[tokio::test]
    async fn test_try_recv() {
        let bus = EventBus::default();
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        bus.emit(completed(0)).ok();
        let received = stream.try_recv().unwrap().unwrap();
        assert_eq!(received, completed(0));
    }
}
