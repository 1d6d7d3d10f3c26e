//! # Microsoft Graph Provider
//!
//! Implements `Connector` for Microsoft Graph (Azure AD users and Intune
//! managed devices).
//!
//! ## Overview
//!
//! This module provides:
//! - OAuth2 client-credentials tokens, cached until 5 minutes before expiry
//! - User listing with `$select`/`$top` and `@odata.nextLink` pagination
//! - Managed device listing with compliance mapping

pub mod auth;
pub mod connector;
pub mod error;
pub mod types;

pub use auth::{GraphCredentials, TokenCache};
pub use connector::MsGraphConnector;
pub use error::{GraphError, Result};
