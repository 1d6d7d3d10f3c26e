//! # Okta Provider
//!
//! Implements `Connector` for the Okta Users API.
//!
//! ## Overview
//!
//! This module provides:
//! - `SSWS` API token authentication
//! - Active and suspended user listing with `Link` header pagination
//! - Status mapping onto the directory's active/disabled vocabulary
//!
//! Okta does not manage devices, so device fetches return nothing.

pub mod connector;
pub mod types;

pub use connector::OktaConnector;
pub use types::{OktaProfile, OktaUser};
