//! Okta API response types
//!
//! Data structures for deserializing Okta Users API responses.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Okta user resource
///
/// See: https://developer.okta.com/docs/reference/api/users/#user-object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OktaUser {
    pub id: Option<String>,

    /// Lifecycle status (`ACTIVE`, `SUSPENDED`, ...)
    pub status: Option<String>,

    pub created: Option<String>,
    pub activated: Option<String>,
    pub last_login: Option<String>,
    pub password_changed: Option<String>,

    pub profile: OktaProfile,
}

/// Okta user profile attributes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OktaProfile {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub title: Option<String>,
    pub manager: Option<String>,
    pub city: Option<String>,
    pub mobile_phone: Option<String>,
    pub primary_phone: Option<String>,
    pub employee_number: Option<String>,
}

/// Map an Okta lifecycle status to `active`, `disabled` or `unknown`.
pub fn map_status(status: Option<&str>) -> &'static str {
    match status {
        Some("ACTIVE") | Some("PROVISIONED") | Some("RECOVERY") => "active",
        Some("SUSPENDED") | Some("DEPROVISIONED") | Some("LOCKED_OUT") => "disabled",
        _ => "unknown",
    }
}

impl OktaUser {
    /// Flatten into the field names the correlation engine reads.
    pub fn standardize(&self) -> Value {
        let profile = &self.profile;
        let full_name = format!(
            "{} {}",
            profile.first_name.as_deref().unwrap_or_default(),
            profile.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string();

        json!({
            "email": profile.email,
            "first_name": profile.first_name,
            "last_name": profile.last_name,
            "full_name": full_name,
            "department": profile.department,
            "title": profile.title,
            "manager": profile.manager,
            "office": profile.city,
            "phone": profile.mobile_phone.as_ref().or(profile.primary_phone.as_ref()),
            "employee_id": profile.employee_number,
            "status": map_status(self.status.as_deref()),
            "last_login": self.last_login,
            "created": self.created,
            "activated": self.activated,
            "password_changed": self.password_changed,
            "okta_id": self.id,
        })
    }
}
