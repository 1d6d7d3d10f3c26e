//! Microsoft Graph response types

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// OAuth2 token response from the Microsoft identity platform.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Graph `user` resource, limited to the selected fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphUser {
    pub id: Option<String>,
    pub user_principal_name: Option<String>,
    pub display_name: Option<String>,
    pub given_name: Option<String>,
    pub surname: Option<String>,
    pub mail: Option<String>,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub office_location: Option<String>,
    pub manager: Option<Value>,
    pub account_enabled: Option<bool>,
    pub user_type: Option<String>,
    pub created_date_time: Option<String>,
    pub last_sign_in_date_time: Option<String>,
}

impl GraphUser {
    /// Flatten into the field names the correlation engine reads.
    pub fn standardize(&self) -> Value {
        json!({
            "id": self.id,
            "email": self.mail.as_ref().or(self.user_principal_name.as_ref()),
            "userPrincipalName": self.user_principal_name,
            "displayName": self.display_name,
            "givenName": self.given_name,
            "surname": self.surname,
            "full_name": self.display_name,
            "jobTitle": self.job_title,
            "department": self.department,
            "office": self.office_location,
            "manager": self.manager,
            "accountEnabled": self.account_enabled.unwrap_or(true),
            "userType": self.user_type.as_deref().unwrap_or("Member"),
            "createdDateTime": self.created_date_time,
            "lastSignInDateTime": self.last_sign_in_date_time,
            "source_system": "Microsoft Graph",
        })
    }
}

/// Intune `managedDevice` resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagedDevice {
    pub id: Option<String>,
    pub device_name: Option<String>,
    pub operating_system: Option<String>,
    pub os_version: Option<String>,
    pub device_type: Option<String>,
    pub compliance_state: Option<String>,
    pub last_sync_date_time: Option<String>,
    pub enrolled_date_time: Option<String>,
    pub user_principal_name: Option<String>,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
}

impl ManagedDevice {
    pub fn standardize(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.device_name,
            "operating_system": self.operating_system,
            "os_version": self.os_version,
            "device_type": self.device_type,
            "compliance_state": self.compliance_state,
            "last_sync": self.last_sync_date_time,
            "enrolled_date": self.enrolled_date_time,
            "user_principal_name": self.user_principal_name,
            "model": self.model,
            "manufacturer": self.manufacturer,
            "compliant": self.compliance_state.as_deref() == Some("compliant"),
            "source_system": "Microsoft Graph",
        })
    }
}

/// Graph `organization` resource
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Organization {
    pub display_name: Option<String>,
    pub verified_domains: Vec<Value>,
}

/// Graph collection envelope
#[derive(Debug, Deserialize)]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}
