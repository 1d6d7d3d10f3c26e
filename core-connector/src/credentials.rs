//! Connection credentials
//!
//! A connection stores its credentials as an opaque JSON object. Decryption
//! is the host's business: it plugs in a [`CredentialResolver`]. The default
//! [`PlaintextCredentialResolver`] reads the blob as-is.

use crate::error::{ApiError, Result};
use async_trait::async_trait;
use core_directory::ApiConnectionConfig;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Key/value credential material for one connection
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    values: HashMap<String, String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("Credentials").field("keys", &keys).finish()
    }
}

impl Credentials {
    /// Parse a JSON object blob. A missing or malformed blob yields empty credentials.
    pub fn parse(blob: Option<&str>) -> Self {
        let Some(blob) = blob.filter(|b| !b.trim().is_empty()) else {
            return Self::default();
        };

        match serde_json::from_str::<HashMap<String, Value>>(blob) {
            Ok(map) => {
                let values = map
                    .into_iter()
                    .filter_map(|(key, value)| match value {
                        Value::Null => None,
                        Value::String(s) => Some((key, s)),
                        other => Some((key, other.to_string())),
                    })
                    .collect();
                Self { values }
            }
            Err(e) => {
                warn!(error = %e, "Credential blob is not a JSON object, ignoring it");
                Self::default()
            }
        }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// # Errors
    ///
    /// Returns [`ApiError::Credentials`] naming the missing key.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| ApiError::Credentials(format!("'{}' not found in credentials", key)))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Turns a connection's stored credential blob into usable credentials.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, connection: &ApiConnectionConfig) -> Result<Credentials>;
}

/// Reads the stored blob without decryption.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextCredentialResolver;

#[async_trait]
impl CredentialResolver for PlaintextCredentialResolver {
    async fn resolve(&self, connection: &ApiConnectionConfig) -> Result<Credentials> {
        Ok(Credentials::parse(connection.credentials.as_deref()))
    }
}
