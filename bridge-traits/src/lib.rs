//! # Host Bridge Traits
//!
//! Abstractions the sync core needs from its host but does not implement itself.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - One HTTP round trip per call
//! - [`Clock`](time::Clock) - Wall-clock source for timestamps and schedules
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to the host
//!
//! ## Implementations
//!
//! | Host | Crate |
//! |------|-------|
//! | Desktop / server | `bridge-desktop` (`reqwest`) |
//! | Tests | `mockall` mocks, [`FixedClock`](time::FixedClock) |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Transport
//! implementations must report failures that produced no response as
//! `Timeout` or `Network`; the request client only retries those.

pub mod error;
pub mod http;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
