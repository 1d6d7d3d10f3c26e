//! Record validation and field extraction
//!
//! Sources disagree on field names, so every attribute is looked up through
//! a list of aliases in priority order. A value counts as present when it is
//! a non-empty string (after trimming) or a number; `null` and blank strings
//! fall through to the next alias.

use crate::error::ValidationError;
use core_directory::{DeviceStatus, IdentityStatus};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

const EMAIL_FIELDS: &[&str] = &["email", "userPrincipalName", "mail"];
const DEPARTMENT_FIELDS: &[&str] = &["department", "dept", "division"];
const ROLE_FIELDS: &[&str] = &["role", "title", "jobTitle"];
const MANAGER_FIELDS: &[&str] = &["manager", "managerDisplayName"];
const LOCATION_FIELDS: &[&str] = &["location", "office", "city"];
const STATUS_FIELDS: &[&str] = &["status", "accountEnabled"];
const EMPLOYEE_ID_FIELDS: &[&str] = &["employee_id", "employeeId", "employeeNumber"];

const DEVICE_NAME_FIELDS: &[&str] = &["name", "hostname", "device_name", "computer_name"];
const IP_FIELDS: &[&str] = &["ip_address", "local_ip"];
const MAC_FIELDS: &[&str] = &["mac_address", "mac"];
const VLAN_FIELDS: &[&str] = &["vlan", "network_segment"];
const OS_FIELDS: &[&str] = &["os_version", "operating_system", "platform"];
const CONNECTIVITY_FIELDS: &[&str] = &["status", "online"];
const COMPLIANCE_FIELDS: &[&str] = &["compliant", "compliant_status"];
const OWNER_EMAIL_FIELDS: &[&str] = &["owner_email", "user_email", "assigned_user", "user_principal_name"];
const OWNER_ID_FIELDS: &[&str] = &["owner_id", "user_id"];

pub const DEFAULT_DEPARTMENT: &str = "Unknown";
pub const DEFAULT_ROLE: &str = "Employee";

/// A user record reduced to the attributes correlation works with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedUser {
    /// Trimmed and lower-cased
    pub email: String,
    pub full_name: String,
    pub department: String,
    pub role: String,
    pub manager: Option<String>,
    pub location: Option<String>,
    pub status: IdentityStatus,
    pub employee_id: Option<String>,
}

/// A device record reduced to the attributes correlation works with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedDevice {
    pub name: String,
    pub ip_address: Option<String>,
    /// Upper-case, colon separated
    pub mac_address: Option<String>,
    pub vlan: Option<String>,
    pub os_version: Option<String>,
    pub status: DeviceStatus,
    pub compliant: bool,
    /// Lower-cased owner email hint
    pub owner_email: Option<String>,
    pub owner_id: Option<String>,
}

/// Extract a [`NormalizedUser`] from a raw source record.
///
/// # Errors
///
/// Returns [`ValidationError::MissingField`] when no email-like field is
/// present, and [`ValidationError::NotAnObject`] for non-object records.
pub fn validate_user_record(raw: &Value, source_system: &str) -> Result<NormalizedUser, ValidationError> {
    let record = raw.as_object().ok_or_else(|| ValidationError::NotAnObject {
        kind: "user",
        source_system: source_system.to_string(),
    })?;

    let email = first_text(record, EMAIL_FIELDS)
        .map(|email| email.to_lowercase())
        .filter(|email| email.contains('@'))
        .ok_or_else(|| ValidationError::MissingField {
            kind: "user",
            field: "email",
            source_system: source_system.to_string(),
        })?;

    let full_name = text(record, "full_name")
        .or_else(|| text(record, "displayName"))
        .or_else(|| joined(record, "firstName", "lastName"))
        .or_else(|| joined(record, "givenName", "surname"))
        .or_else(|| {
            email
                .split('@')
                .next()
                .filter(|local| !local.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| email.clone());

    Ok(NormalizedUser {
        full_name,
        department: first_text(record, DEPARTMENT_FIELDS)
            .unwrap_or_else(|| DEFAULT_DEPARTMENT.to_string()),
        role: first_text(record, ROLE_FIELDS).unwrap_or_else(|| DEFAULT_ROLE.to_string()),
        manager: first_text(record, MANAGER_FIELDS),
        location: first_text(record, LOCATION_FIELDS),
        status: identity_status(first_present(record, STATUS_FIELDS)),
        employee_id: first_text(record, EMPLOYEE_ID_FIELDS),
        email,
    })
}

/// Extract a [`NormalizedDevice`] from a raw source record.
///
/// A record without any name field gets a generated `"Unknown Device <hex>"`
/// placeholder rather than failing.
///
/// # Errors
///
/// Returns [`ValidationError::NotAnObject`] for non-object records.
pub fn validate_device_record(raw: &Value, source_system: &str) -> Result<NormalizedDevice, ValidationError> {
    let record = raw.as_object().ok_or_else(|| ValidationError::NotAnObject {
        kind: "device",
        source_system: source_system.to_string(),
    })?;

    let name = first_text(record, DEVICE_NAME_FIELDS).unwrap_or_else(|| {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("Unknown Device {}", &suffix[..8])
    });

    Ok(NormalizedDevice {
        name,
        ip_address: first_text(record, IP_FIELDS),
        mac_address: first_text(record, MAC_FIELDS).map(|mac| normalize_mac(&mac)),
        vlan: first_text(record, VLAN_FIELDS),
        os_version: first_text(record, OS_FIELDS),
        status: device_status(first_present(record, CONNECTIVITY_FIELDS)),
        compliant: is_compliant(first_present(record, COMPLIANCE_FIELDS)),
        owner_email: first_text(record, OWNER_EMAIL_FIELDS).map(|email| email.to_lowercase()),
        owner_id: first_text(record, OWNER_ID_FIELDS),
    })
}

/// `aa-bb-cc-dd-ee-ff` and `AA:BB:CC:DD:EE:FF` compare equal after this.
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_uppercase().replace('-', ":")
}

// =============================================================================
// Field helpers
// =============================================================================

fn text(record: &Map<String, Value>, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_text(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| text(record, key))
}

fn joined(record: &Map<String, Value>, first: &str, last: &str) -> Option<String> {
    let name = [text(record, first), text(record, last)]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    Some(name).filter(|n| !n.is_empty())
}

/// First alias holding a non-null, non-blank value of any type.
fn first_present<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| match record.get(*key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(value) => Some(value),
    })
}

fn lowered(value: &Value) -> Option<String> {
    value.as_str().map(|s| s.trim().to_lowercase())
}

fn identity_status(value: Option<&Value>) -> IdentityStatus {
    let Some(value) = value else {
        return IdentityStatus::Active;
    };
    let active = match value {
        Value::Bool(enabled) => *enabled,
        other => matches!(lowered(other).as_deref(), Some("active" | "enabled" | "true")),
    };
    if active {
        IdentityStatus::Active
    } else {
        IdentityStatus::Disabled
    }
}

fn device_status(value: Option<&Value>) -> DeviceStatus {
    match value {
        Some(Value::Bool(true)) => DeviceStatus::Connected,
        Some(Value::Bool(false)) => DeviceStatus::Disconnected,
        Some(other) => match lowered(other).as_deref() {
            Some("online" | "connected" | "true") => DeviceStatus::Connected,
            Some("offline" | "disconnected" | "false") => DeviceStatus::Disconnected,
            _ => DeviceStatus::Unknown,
        },
        None => DeviceStatus::Unknown,
    }
}

fn is_compliant(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(compliant)) => *compliant,
        Some(other) => matches!(lowered(other).as_deref(), Some("compliant" | "pass" | "true")),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_email_aliases_are_normalized() {
        let okta = validate_user_record(&json!({"email": "  Jane.Doe@Corp.Example "}), "Okta").unwrap();
        assert_eq!(okta.email, "jane.doe@corp.example");

        let graph = validate_user_record(
            &json!({"mail": null, "userPrincipalName": "JDOE@corp.example"}),
            "Azure AD",
        )
        .unwrap();
        assert_eq!(graph.email, "jdoe@corp.example");
    }

    #[test]
    fn test_user_without_email_is_rejected() {
        let err = validate_user_record(&json!({"displayName": "No Mail", "email": ""}), "Okta").unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                kind: "user",
                field: "email",
                source_system: "Okta".to_string()
            }
        );

        assert!(validate_user_record(&json!({"email": "not-an-address"}), "Okta").is_err());
        assert!(matches!(
            validate_user_record(&json!(["jane@corp.example"]), "Okta"),
            Err(ValidationError::NotAnObject { .. })
        ));
    }

    #[test]
    fn test_full_name_fallbacks() {
        let display = validate_user_record(
            &json!({"email": "a@x.com", "displayName": "Ann Lee", "firstName": "Annie"}),
            "Okta",
        )
        .unwrap();
        assert_eq!(display.full_name, "Ann Lee");

        let parts = validate_user_record(
            &json!({"email": "a@x.com", "givenName": "Ann", "surname": "Lee"}),
            "Azure AD",
        )
        .unwrap();
        assert_eq!(parts.full_name, "Ann Lee");

        let only_first = validate_user_record(&json!({"email": "a@x.com", "firstName": "Ann"}), "Okta").unwrap();
        assert_eq!(only_first.full_name, "Ann");

        let local_part = validate_user_record(&json!({"email": "ann.lee@x.com"}), "Okta").unwrap();
        assert_eq!(local_part.full_name, "ann.lee");
    }

    #[test]
    fn test_user_defaults() {
        let user = validate_user_record(&json!({"email": "a@x.com"}), "Okta").unwrap();

        assert_eq!(user.department, "Unknown");
        assert_eq!(user.role, "Employee");
        assert_eq!(user.manager, None);
        assert_eq!(user.location, None);
        assert_eq!(user.status, IdentityStatus::Active);
        assert_eq!(user.employee_id, None);
    }

    #[test]
    fn test_user_attribute_aliases() {
        let user = validate_user_record(
            &json!({
                "email": "a@x.com",
                "division": "Finance",
                "jobTitle": "Analyst",
                "managerDisplayName": "Bo Chan",
                "city": "Oslo",
                "employeeNumber": 4411
            }),
            "Workday",
        )
        .unwrap();

        assert_eq!(user.department, "Finance");
        assert_eq!(user.role, "Analyst");
        assert_eq!(user.manager.as_deref(), Some("Bo Chan"));
        assert_eq!(user.location.as_deref(), Some("Oslo"));
        assert_eq!(user.employee_id.as_deref(), Some("4411"));
    }

    #[test]
    fn test_user_status_mapping() {
        let status = |raw: Value| validate_user_record(&raw, "Okta").unwrap().status;

        assert_eq!(status(json!({"email": "a@x.com", "status": "ACTIVE"})), IdentityStatus::Active);
        assert_eq!(status(json!({"email": "a@x.com", "status": "Enabled"})), IdentityStatus::Active);
        assert_eq!(status(json!({"email": "a@x.com", "status": "suspended"})), IdentityStatus::Disabled);
        assert_eq!(status(json!({"email": "a@x.com", "accountEnabled": true})), IdentityStatus::Active);
        assert_eq!(status(json!({"email": "a@x.com", "accountEnabled": false})), IdentityStatus::Disabled);
        assert_eq!(
            status(json!({"email": "a@x.com", "status": "", "accountEnabled": false})),
            IdentityStatus::Disabled
        );
    }

    #[test]
    fn test_device_fields() {
        let device = validate_device_record(
            &json!({
                "hostname": "LAPTOP-JANE",
                "local_ip": "10.0.0.7",
                "mac": "aa-bb-cc-dd-ee-ff",
                "network_segment": "corp-2",
                "platform": "macOS 14.4",
                "online": false,
                "compliant_status": "Pass",
                "assigned_user": "Jane@Corp.Example",
                "user_id": "id-1"
            }),
            "Cisco ISE",
        )
        .unwrap();

        assert_eq!(device.name, "LAPTOP-JANE");
        assert_eq!(device.ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(device.mac_address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(device.vlan.as_deref(), Some("corp-2"));
        assert_eq!(device.os_version.as_deref(), Some("macOS 14.4"));
        assert_eq!(device.status, DeviceStatus::Disconnected);
        assert!(device.compliant);
        assert_eq!(device.owner_email.as_deref(), Some("jane@corp.example"));
        assert_eq!(device.owner_id.as_deref(), Some("id-1"));
    }

    #[test]
    fn test_device_name_placeholder() {
        let device = validate_device_record(&json!({"ip_address": "10.0.0.9"}), "Network Scanner").unwrap();

        assert!(device.name.starts_with("Unknown Device "));
        assert_eq!(device.name.len(), "Unknown Device ".len() + 8);
        assert_eq!(device.status, DeviceStatus::Unknown);
        assert!(!device.compliant);
    }

    #[test]
    fn test_device_status_and_compliance_signals() {
        let device = |raw: Value| validate_device_record(&raw, "Jamf").unwrap();

        assert_eq!(device(json!({"status": "Online"})).status, DeviceStatus::Connected);
        assert_eq!(device(json!({"online": true})).status, DeviceStatus::Connected);
        assert_eq!(device(json!({"status": "Disconnected"})).status, DeviceStatus::Disconnected);
        assert_eq!(device(json!({"status": "sleeping"})).status, DeviceStatus::Unknown);

        assert!(device(json!({"compliant": true})).compliant);
        assert!(device(json!({"compliant": "Compliant"})).compliant);
        assert!(!device(json!({"compliant": "noncompliant"})).compliant);
        assert!(!device(json!({"compliant": false, "compliant_status": "pass"})).compliant);
    }

    #[test]
    fn test_graph_device_owner_hint() {
        let device = validate_device_record(
            &json!({"name": "DESKTOP-1", "user_principal_name": "Bob@Corp.Example"}),
            "Intune",
        )
        .unwrap();
        assert_eq!(device.owner_email.as_deref(), Some("bob@corp.example"));
    }
}
