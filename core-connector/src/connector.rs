//! The contract every source adapter implements.

use crate::error::Result;
use async_trait::async_trait;
use core_directory::{ApiConnectionConfig, ProviderKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Outcome of an ad hoc connectivity probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub success: bool,
    pub message: String,
    /// Provider-specific facts about the remote side (tenant, account, ...)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl HealthCheckResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Source adapter for one external provider
///
/// Records are returned as raw JSON objects; field extraction and matching
/// happen in the correlation engine.
#[async_trait]
pub trait Connector: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Probe the remote API with the configured credentials
    ///
    /// # Errors
    ///
    /// Returns the request failure; callers render it as a failed health check.
    async fn test_connection(&self) -> Result<HealthCheckResult>;

    /// Every user record the source exposes, across all pages.
    async fn fetch_users(&self) -> Result<Vec<Value>>;

    /// Every device record the source exposes, across all pages.
    async fn fetch_devices(&self) -> Result<Vec<Value>>;
}

/// Builds a ready-to-use connector for a configured connection
///
/// Implementations resolve credentials and pick the adapter for the
/// connection's provider kind.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ApiError::UnsupportedProvider`](crate::ApiError::UnsupportedProvider)
    /// for provider kinds without an adapter, and
    /// [`ApiError::Credentials`](crate::ApiError::Credentials) when required
    /// credentials are missing.
    async fn create(&self, connection: &ApiConnectionConfig) -> Result<Arc<dyn Connector>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_health_check_result_serialization() {
        let result = HealthCheckResult::success("Connected to Okta as admin@corp.example")
            .with_detail("api_version", "v1");

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["details"]["api_version"], "v1");

        let failure = serde_json::to_value(HealthCheckResult::failure("HTTP 401")).unwrap();
        assert_eq!(failure, json!({"success": false, "message": "HTTP 401"}));
    }
}
