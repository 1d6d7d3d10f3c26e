//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the identity sync core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! Every other core crate depends on this one for its configuration values,
//! its logging conventions and the broadcast channel used to publish sync and
//! correlation events.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
