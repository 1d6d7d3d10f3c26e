//! Source-category precedence table
//!
//! Which source wins a field conflict depends on what kind of system it is.
//! [`SourcePolicy`] maps source system names to a [`SourceCategory`]:
//!
//! | Category | Wins |
//! |---|---|
//! | `Hr` | department, role |
//! | `IdentityProvider` | identity status |
//! | `Security` | device compliance, connectivity |
//! | `Network` | device IP, VLAN |
//! | `Other` | nothing beyond the any-source rules |
//!
//! Names compare case-insensitively. A connection named after a known source
//! with a suffix (`"Okta-Prod"`, `"Workday EU"`) takes that source's category.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    Hr,
    IdentityProvider,
    Security,
    Network,
    #[default]
    Other,
}

impl SourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::Hr => "hr",
            SourceCategory::IdentityProvider => "identity_provider",
            SourceCategory::Security => "security",
            SourceCategory::Network => "network",
            SourceCategory::Other => "other",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const DEFAULT_SOURCES: &[(&str, SourceCategory)] = &[
    ("Workday", SourceCategory::Hr),
    ("BambooHR", SourceCategory::Hr),
    ("ADP", SourceCategory::Hr),
    ("Okta", SourceCategory::IdentityProvider),
    ("Azure AD", SourceCategory::IdentityProvider),
    ("Auth0", SourceCategory::IdentityProvider),
    ("Microsoft Graph", SourceCategory::IdentityProvider),
    ("CrowdStrike", SourceCategory::Security),
    ("Jamf", SourceCategory::Security),
    ("Intune", SourceCategory::Security),
    ("Carbon Black", SourceCategory::Security),
    ("Cisco ISE", SourceCategory::Network),
    ("Aruba ClearPass", SourceCategory::Network),
    ("Network Scanner", SourceCategory::Network),
];

/// Source name to category lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePolicy {
    sources: HashMap<String, SourceCategory>,
}

impl Default for SourcePolicy {
    fn default() -> Self {
        DEFAULT_SOURCES
            .iter()
            .fold(Self::empty(), |policy, (name, category)| policy.with_source(*name, *category))
    }
}

impl SourcePolicy {
    /// A table where every source is `Other`.
    pub fn empty() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    pub fn with_source(mut self, name: impl AsRef<str>, category: SourceCategory) -> Self {
        self.insert(name, category);
        self
    }

    /// Add or reclassify a source.
    pub fn insert(&mut self, name: impl AsRef<str>, category: SourceCategory) {
        self.sources.insert(key(name.as_ref()), category);
    }

    pub fn classify(&self, source_system: &str) -> SourceCategory {
        let wanted = key(source_system);
        if let Some(category) = self.sources.get(&wanted) {
            return *category;
        }

        // Longest known name that prefixes the source at a word boundary
        self.sources
            .iter()
            .filter(|(name, _)| {
                wanted.starts_with(name.as_str())
                    && wanted[name.len()..]
                        .chars()
                        .next()
                        .is_some_and(|c| !c.is_alphanumeric())
            })
            .max_by_key(|(name, _)| name.len())
            .map(|(_, category)| *category)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let policy = SourcePolicy::default();

        assert_eq!(policy.classify("Workday"), SourceCategory::Hr);
        assert_eq!(policy.classify("ADP"), SourceCategory::Hr);
        assert_eq!(policy.classify("Okta"), SourceCategory::IdentityProvider);
        assert_eq!(policy.classify("Azure AD"), SourceCategory::IdentityProvider);
        assert_eq!(policy.classify("Carbon Black"), SourceCategory::Security);
        assert_eq!(policy.classify("Aruba ClearPass"), SourceCategory::Network);
        assert_eq!(policy.classify("Salesforce"), SourceCategory::Other);
        assert_eq!(policy.len(), DEFAULT_SOURCES.len());
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let policy = SourcePolicy::default();
        assert_eq!(policy.classify("  bamboohr "), SourceCategory::Hr);
        assert_eq!(policy.classify("CROWDSTRIKE"), SourceCategory::Security);
    }

    #[test]
    fn test_suffixed_connection_names() {
        let policy = SourcePolicy::default();

        assert_eq!(policy.classify("Okta-Prod"), SourceCategory::IdentityProvider);
        assert_eq!(policy.classify("Workday EU"), SourceCategory::Hr);
        assert_eq!(policy.classify("Cisco ISE (HQ)"), SourceCategory::Network);
        // No boundary after the known name
        assert_eq!(policy.classify("Oktagon"), SourceCategory::Other);
    }

    #[test]
    fn test_custom_sources() {
        let mut policy = SourcePolicy::empty().with_source("Rippling", SourceCategory::Hr);
        assert_eq!(policy.classify("rippling"), SourceCategory::Hr);
        assert_eq!(policy.classify("Okta"), SourceCategory::Other);

        policy.insert("Rippling", SourceCategory::IdentityProvider);
        assert_eq!(policy.classify("Rippling"), SourceCategory::IdentityProvider);
    }
}
