//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates. Host applications can depend on `idsync-workspace` and
//! enable `desktop-shims` (reqwest transport) or `embedded` (host-provided
//! `HttpClient`) without wiring each crate individually.

#[cfg(any(feature = "desktop-shims", feature = "embedded"))]
pub use core_service;
