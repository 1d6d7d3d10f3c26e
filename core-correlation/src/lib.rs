//! # Core Correlation
//!
//! Turns raw records pulled by connectors into canonical identities and
//! devices.
//!
//! ## Components
//!
//! - **Validation** (`validation`): field extraction across source dialects
//! - **Source Policy** (`policy`): which kind of source wins which field
//! - **Correlation Engine** (`engine`): matching, conflict resolution, owner
//!   inference and orphan detection
//! - **Device Naming** (`naming`): `"First Last's Laptop"` style names
//! - **Outcome** (`outcome`): per-record results folded into batch totals

pub mod engine;
pub mod error;
mod locks;
pub mod naming;
pub mod orphans;
pub mod outcome;
pub mod policy;
pub mod validation;

pub use engine::CorrelationEngine;
pub use error::{CorrelationError, Result, ValidationError};
pub use naming::improve_device_name;
pub use orphans::OrphanReport;
pub use outcome::{CorrelationOutcome, DeviceCorrelation, UserCorrelation};
pub use policy::{SourceCategory, SourcePolicy};
pub use validation::{
    normalize_mac, validate_device_record, validate_user_record, NormalizedDevice, NormalizedUser,
};
