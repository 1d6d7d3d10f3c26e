//! # Core Connector
//!
//! Shared machinery for source adapters:
//!
//! - [`RequestClient`]: rate limiting, retry with backoff, 429 handling
//! - [`RequestClient::paginate`]: lazy multi-style pagination
//! - [`Connector`] / [`ConnectorFactory`]: the adapter contract
//! - [`Credentials`] / [`CredentialResolver`]: opaque credential blobs
//!
//! Concrete adapters live in the `provider-*` crates.

pub mod connector;
pub mod credentials;
pub mod error;
pub mod pagination;
pub mod rate_limiter;
pub mod request_client;

pub use connector::{Connector, ConnectorFactory, HealthCheckResult};
pub use credentials::{CredentialResolver, Credentials, PlaintextCredentialResolver};
pub use error::{ApiError, Result};
pub use pagination::{DefaultPageExtractor, PageExtractor, DEFAULT_MAX_PAGES};
pub use rate_limiter::SlidingWindowLimiter;
pub use request_client::{RequestClient, RequestOptions};
