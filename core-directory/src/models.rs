//! Domain models for the canonical directory
//!
//! Identifiers are UUID strings and timestamps are Unix seconds supplied by
//! the caller's clock, so the store itself never reads the wall clock.

use crate::error::{DirectoryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Generate a fresh entity identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

macro_rules! text_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DirectoryError;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(DirectoryError::InvalidData(format!(
                        "Invalid {}: {}",
                        $label, s
                    ))),
                }
            }
        }
    };
}

// =============================================================================
// Status Enums
// =============================================================================

/// Lifecycle status of a canonical identity. Identities are disabled, never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    #[default]
    Active,
    Disabled,
}

text_enum!(IdentityStatus, "identity status", {
    Active => "active",
    Disabled => "disabled",
});

/// Connectivity status of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Connected,
    Disconnected,
    #[default]
    Unknown,
}

text_enum!(DeviceStatus, "device status", {
    Connected => "connected",
    Disconnected => "disconnected",
    Unknown => "unknown",
});

/// Health status of a configured connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
    Error,
    Testing,
    Disabled,
}

text_enum!(ConnectionStatus, "connection status", {
    Connected => "connected",
    Disconnected => "disconnected",
    Error => "error",
    Testing => "testing",
    Disabled => "disabled",
});

/// Unit of a connection's rate-limit budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitWindow {
    #[default]
    Minute,
    Hour,
}

text_enum!(RateLimitWindow, "rate limit window", {
    Minute => "minute",
    Hour => "hour",
});

impl RateLimitWindow {
    pub fn duration(&self) -> Duration {
        match self {
            RateLimitWindow::Minute => Duration::from_secs(60),
            RateLimitWindow::Hour => Duration::from_secs(60 * 60),
        }
    }
}

/// What triggered a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Full,
    Incremental,
    Manual,
}

text_enum!(SyncKind, "sync kind", {
    Full => "full",
    Incremental => "incremental",
    Manual => "manual",
});

/// Status of a sync run.
///
/// ```text
/// running -> success
/// running -> partial   (some records failed)
/// running -> error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncRunStatus {
    Running,
    Success,
    Error,
    Partial,
}

text_enum!(SyncRunStatus, "sync run status", {
    Running => "running",
    Success => "success",
    Error => "error",
    Partial => "partial",
});

impl SyncRunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncRunStatus::Running)
    }
}

// =============================================================================
// Provider Kind
// =============================================================================

/// External system behind a connection.
///
/// Stored in the upper-snake form used by connection configuration
/// (`OKTA`, `AZURE_AD`, `CROWDSTRIKE`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    Okta,
    /// Azure AD / Entra ID through Microsoft Graph
    AzureAd,
    CrowdStrike,
    Workday,
    BambooHr,
    Jamf,
    Intune,
    Custom,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 8] = [
        ProviderKind::Okta,
        ProviderKind::AzureAd,
        ProviderKind::CrowdStrike,
        ProviderKind::Workday,
        ProviderKind::BambooHr,
        ProviderKind::Jamf,
        ProviderKind::Intune,
        ProviderKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Okta => "OKTA",
            ProviderKind::AzureAd => "AZURE_AD",
            ProviderKind::CrowdStrike => "CROWDSTRIKE",
            ProviderKind::Workday => "WORKDAY",
            ProviderKind::BambooHr => "BAMBOOHR",
            ProviderKind::Jamf => "JAMF",
            ProviderKind::Intune => "INTUNE",
            ProviderKind::Custom => "CUSTOM",
        }
    }

    /// Human readable product name.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Okta => "Okta",
            ProviderKind::AzureAd => "Azure AD",
            ProviderKind::CrowdStrike => "CrowdStrike",
            ProviderKind::Workday => "Workday",
            ProviderKind::BambooHr => "BambooHR",
            ProviderKind::Jamf => "Jamf",
            ProviderKind::Intune => "Intune",
            ProviderKind::Custom => "Custom",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "OKTA" => Ok(ProviderKind::Okta),
            "AZURE_AD" | "AZUREAD" | "MICROSOFT_GRAPH" | "ENTRA_ID" => Ok(ProviderKind::AzureAd),
            "CROWDSTRIKE" => Ok(ProviderKind::CrowdStrike),
            "WORKDAY" => Ok(ProviderKind::Workday),
            "BAMBOOHR" | "BAMBOO_HR" => Ok(ProviderKind::BambooHr),
            "JAMF" => Ok(ProviderKind::Jamf),
            "INTUNE" => Ok(ProviderKind::Intune),
            "CUSTOM" => Ok(ProviderKind::Custom),
            _ => Err(DirectoryError::InvalidData(format!(
                "Invalid provider kind: {}",
                s
            ))),
        }
    }
}

// =============================================================================
// Domain Models
// =============================================================================

/// One real person, deduplicated across every source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalIdentity {
    pub id: String,
    /// Lower-cased, trimmed; unique across the directory
    pub email: String,
    pub full_name: String,
    pub department: String,
    pub role: String,
    pub manager: Option<String>,
    pub location: Option<String>,
    pub status: IdentityStatus,
    /// HR or directory employee number, when a source provides one
    pub employee_id: Option<String>,
    pub last_seen: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CanonicalIdentity {
    pub fn new(
        email: impl Into<String>,
        full_name: impl Into<String>,
        department: impl Into<String>,
        role: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            id: new_id(),
            email: email.into().trim().to_lowercase(),
            full_name: full_name.into(),
            department: department.into(),
            role: role.into(),
            manager: None,
            location: None,
            status: IdentityStatus::Active,
            employee_id: None,
            last_seen: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    /// First and last whitespace-separated parts of the full name, if there are at least two.
    pub fn first_and_last_name(&self) -> Option<(&str, &str)> {
        let mut parts = self.full_name.split_whitespace();
        let first = parts.next()?;
        let last = parts.last()?;
        Some((first, last))
    }

    pub fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Err(DirectoryError::InvalidData(format!(
                "Identity email is not an address: '{}'",
                self.email
            )));
        }
        if self.email != self.email.trim().to_lowercase() {
            return Err(DirectoryError::InvalidData(
                "Identity email must be trimmed and lower-cased".to_string(),
            ));
        }
        if self.full_name.trim().is_empty() {
            return Err(DirectoryError::InvalidData(
                "Identity full name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// One real endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    /// Owning identity; `None` marks an orphaned device
    pub owner_id: Option<String>,
    pub ip_address: Option<String>,
    /// Upper-case, colon separated
    pub mac_address: Option<String>,
    pub vlan: Option<String>,
    pub os_version: Option<String>,
    pub status: DeviceStatus,
    pub compliant: bool,
    pub last_seen: Option<i64>,
    pub last_check_in: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Device {
    pub fn new(name: impl Into<String>, now: i64) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            owner_id: None,
            ip_address: None,
            mac_address: None,
            vlan: None,
            os_version: None,
            status: DeviceStatus::Unknown,
            compliant: false,
            last_seen: Some(now),
            last_check_in: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DirectoryError::InvalidData(
                "Device name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// An account held in some downstream service, optionally linked to an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAccount {
    pub id: String,
    pub service: String,
    pub status: String,
    pub user_email: Option<String>,
    pub identity_id: Option<String>,
    pub created_at: i64,
}

impl ExternalAccount {
    pub fn new(service: impl Into<String>, user_email: Option<String>, now: i64) -> Self {
        Self {
            id: new_id(),
            service: service.into(),
            status: IdentityStatus::Active.as_str().to_string(),
            user_email,
            identity_id: None,
            created_at: now,
        }
    }
}

/// Audit trail entry written after a successful correlation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub identity_id: Option<String>,
    pub device_id: Option<String>,
    pub source_system: String,
    pub description: String,
    pub created_at: i64,
}

impl ActivityRecord {
    pub fn new(source_system: impl Into<String>, description: impl Into<String>, now: i64) -> Self {
        Self {
            id: new_id(),
            identity_id: None,
            device_id: None,
            source_system: source_system.into(),
            description: description.into(),
            created_at: now,
        }
    }

    pub fn with_identity(mut self, identity_id: impl Into<String>) -> Self {
        self.identity_id = Some(identity_id.into());
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

/// A configured external source.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConnectionConfig {
    pub id: String,
    /// Display name, also used as the source system name during correlation
    pub name: String,
    pub provider: ProviderKind,
    pub base_url: String,
    pub api_version: Option<String>,
    /// Opaque credential blob, decrypted by the host
    pub credentials: Option<String>,
    pub sync_enabled: bool,
    /// Free-form minutes; unset or unparsable falls back to the configured default
    pub sync_interval_minutes: Option<String>,
    pub last_sync: Option<i64>,
    pub next_sync: Option<i64>,
    pub status: ConnectionStatus,
    pub health_check_message: Option<String>,
    pub last_health_check: Option<i64>,
    pub rate_limit_requests: i64,
    pub rate_limit_window: RateLimitWindow,
    pub supports_users: bool,
    pub supports_devices: bool,
    pub supports_groups: bool,
    pub supports_realtime: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl fmt::Debug for ApiConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConnectionConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials.as_ref().map(|_| "[REDACTED]"))
            .field("sync_enabled", &self.sync_enabled)
            .field("sync_interval_minutes", &self.sync_interval_minutes)
            .field("next_sync", &self.next_sync)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Default request budget per rate-limit window.
pub const DEFAULT_RATE_LIMIT_REQUESTS: i64 = 100;

impl ApiConnectionConfig {
    pub fn new(
        name: impl Into<String>,
        provider: ProviderKind,
        base_url: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            provider,
            base_url: base_url.into(),
            api_version: None,
            credentials: None,
            sync_enabled: true,
            sync_interval_minutes: None,
            last_sync: None,
            next_sync: None,
            status: ConnectionStatus::Disconnected,
            health_check_message: None,
            last_health_check: None,
            rate_limit_requests: DEFAULT_RATE_LIMIT_REQUESTS,
            rate_limit_window: RateLimitWindow::Minute,
            supports_users: false,
            supports_devices: false,
            supports_groups: false,
            supports_realtime: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sync interval in minutes, or `default` when unset, unparsable or not positive.
    pub fn interval_minutes(&self, default: i64) -> i64 {
        self.sync_interval_minutes
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|minutes| *minutes > 0)
            .unwrap_or(default)
    }

    /// Enabled and either never scheduled or scheduled at or before `now`.
    pub fn is_due(&self, now: i64) -> bool {
        self.sync_enabled && self.next_sync.map_or(true, |next| next <= now)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DirectoryError::InvalidData(
                "Connection name cannot be empty".to_string(),
            ));
        }
        if self.base_url.trim().is_empty() {
            return Err(DirectoryError::InvalidData(
                "Connection base URL cannot be empty".to_string(),
            ));
        }
        if self.rate_limit_requests < 1 {
            return Err(DirectoryError::InvalidData(
                "Rate limit budget must allow at least one request".to_string(),
            ));
        }
        Ok(())
    }
}

/// One execution of a sync against one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunRecord {
    pub id: String,
    pub connection_id: String,
    pub kind: SyncKind,
    pub status: SyncRunStatus,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub duration_secs: Option<i64>,
    pub records_processed: i64,
    pub records_created: i64,
    pub records_updated: i64,
    pub records_failed: i64,
    pub error_message: Option<String>,
}

impl SyncRunRecord {
    /// A run in `running` state, ready to be persisted before any work starts.
    pub fn running(connection_id: impl Into<String>, kind: SyncKind, now: i64) -> Self {
        Self {
            id: new_id(),
            connection_id: connection_id.into(),
            kind,
            status: SyncRunStatus::Running,
            started_at: now,
            completed_at: None,
            duration_secs: None,
            records_processed: 0,
            records_created: 0,
            records_updated: 0,
            records_failed: 0,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_is_case_insensitive() {
        assert_eq!("Active".parse::<IdentityStatus>().unwrap(), IdentityStatus::Active);
        assert_eq!("DISCONNECTED".parse::<DeviceStatus>().unwrap(), DeviceStatus::Disconnected);
        assert_eq!("partial".parse::<SyncRunStatus>().unwrap(), SyncRunStatus::Partial);
        assert!("paused".parse::<SyncRunStatus>().is_err());
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("OKTA".parse::<ProviderKind>().unwrap(), ProviderKind::Okta);
        assert_eq!("azure_ad".parse::<ProviderKind>().unwrap(), ProviderKind::AzureAd);
        assert_eq!("microsoft-graph".parse::<ProviderKind>().unwrap(), ProviderKind::AzureAd);
        assert_eq!("CROWDSTRIKE".parse::<ProviderKind>().unwrap(), ProviderKind::CrowdStrike);
        assert!("GOOGLE".parse::<ProviderKind>().is_err());

        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_identity_email_is_normalized() {
        let identity = CanonicalIdentity::new("  Jane.Doe@Corp.Example ", "Jane Doe", "Eng", "Engineer", 10);
        assert_eq!(identity.email, "jane.doe@corp.example");
        assert!(identity.validate().is_ok());
        assert_eq!(identity.first_and_last_name(), Some(("Jane", "Doe")));
    }

    #[test]
    fn test_single_word_name_has_no_first_and_last() {
        let identity = CanonicalIdentity::new("cher@corp.example", "Cher", "Music", "Singer", 10);
        assert_eq!(identity.first_and_last_name(), None);
    }

    #[test]
    fn test_identity_validation() {
        let mut identity = CanonicalIdentity::new("nobody", "No Body", "Eng", "Engineer", 10);
        assert!(identity.validate().is_err());

        identity.email = "no.body@corp.example".to_string();
        identity.full_name = "  ".to_string();
        assert!(identity.validate().is_err());
    }

    #[test]
    fn test_interval_minutes_fallback() {
        let mut connection = ApiConnectionConfig::new("Okta", ProviderKind::Okta, "https://x", 0);
        assert_eq!(connection.interval_minutes(60), 60);

        connection.sync_interval_minutes = Some("15".to_string());
        assert_eq!(connection.interval_minutes(60), 15);

        connection.sync_interval_minutes = Some("every hour".to_string());
        assert_eq!(connection.interval_minutes(60), 60);

        connection.sync_interval_minutes = Some("0".to_string());
        assert_eq!(connection.interval_minutes(60), 60);
    }

    #[test]
    fn test_connection_due() {
        let mut connection = ApiConnectionConfig::new("Okta", ProviderKind::Okta, "https://x", 0);
        assert!(connection.is_due(100));

        connection.next_sync = Some(100);
        assert!(connection.is_due(100));
        assert!(!connection.is_due(99));

        connection.sync_enabled = false;
        assert!(!connection.is_due(1_000));
    }

    #[test]
    fn test_connection_debug_hides_credentials() {
        let mut connection = ApiConnectionConfig::new("Okta", ProviderKind::Okta, "https://x", 0);
        connection.credentials = Some(r#"{"api_token":"00abc"}"#.to_string());

        let debug = format!("{:?}", connection);
        assert!(!debug.contains("00abc"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_rate_limit_window_duration() {
        assert_eq!(RateLimitWindow::Minute.duration(), Duration::from_secs(60));
        assert_eq!(RateLimitWindow::Hour.duration(), Duration::from_secs(3600));
    }

    #[test]
    fn test_running_record() {
        let run = SyncRunRecord::running("conn-1", SyncKind::Manual, 42);
        assert_eq!(run.status, SyncRunStatus::Running);
        assert!(!run.status.is_terminal());
        assert_eq!(run.started_at, 42);
        assert!(run.completed_at.is_none());
    }
}
