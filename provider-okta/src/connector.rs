//! Okta API connector implementation
//!
//! Implements the `Connector` trait for the Okta Users API v1.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpResponse, RetryPolicy};
use core_connector::pagination::link_header_next;
use core_connector::{
    Connector, Credentials, HealthCheckResult, PageExtractor, RequestClient, RequestOptions,
    Result,
};
use core_directory::{ApiConnectionConfig, ProviderKind};
use core_runtime::logging::redact_if_sensitive;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::types::OktaUser;

/// Maximum results per page (Okta API limit)
const MAX_PAGE_SIZE: u32 = 200;

/// Only users that can still sign in or be reactivated
const USER_STATUS_FILTER: &str = r#"status eq "ACTIVE" or status eq "SUSPENDED""#;

/// Okta pages are bare arrays; the next page is announced in the `Link` header.
struct OktaPages;

impl PageExtractor for OktaPages {
    fn records(&self, body: &Value) -> Vec<Value> {
        body.as_array().cloned().unwrap_or_default()
    }

    fn next_page(&self, _body: &Value, response: &HttpResponse) -> Option<String> {
        link_header_next(response)
    }
}

/// Okta API connector
///
/// # Example
///
/// ```ignore
/// use provider_okta::OktaConnector;
///
/// let connector = OktaConnector::from_connection(&connection, &credentials, http, policy)?;
/// let users = connector.fetch_users().await?;
/// ```
pub struct OktaConnector {
    client: RequestClient,
}

impl OktaConnector {
    /// Wrap a request client already pointed at the Okta org URL.
    pub fn new(client: RequestClient, api_token: &str) -> Self {
        let client = client
            .with_default_header("Authorization", format!("SSWS {}", api_token))
            .with_default_header("Accept", "application/json")
            .with_default_header("Content-Type", "application/json");
        Self { client }
    }

    /// # Errors
    ///
    /// Returns `ApiError::Credentials` when `api_token` is missing and
    /// `ApiError::InvalidUrl` for a malformed org URL.
    pub fn from_connection(
        connection: &ApiConnectionConfig,
        credentials: &Credentials,
        http: Arc<dyn HttpClient>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let api_token = credentials.require("api_token")?;
        let client = RequestClient::for_connection(connection, http, policy)?;
        Ok(Self::new(client, api_token))
    }

    /// Cap on pages followed per listing.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.client = self.client.with_max_pages(max_pages);
        self
    }
}

#[async_trait]
impl Connector for OktaConnector {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Okta
    }

    #[instrument(skip(self), fields(source = %self.client.source_name()))]
    async fn test_connection(&self) -> Result<HealthCheckResult> {
        match self
            .client
            .get_json::<OktaUser>("/api/v1/users/me", RequestOptions::new())
            .await
        {
            Ok(me) => {
                let email = me.profile.email.clone();
                info!(
                    user = %redact_if_sensitive("email", email.as_deref().unwrap_or("unknown")),
                    "Okta connection verified"
                );

                let mut result = HealthCheckResult::success(format!(
                    "Connected to Okta as {}",
                    email.as_deref().unwrap_or("unknown")
                ))
                .with_detail("okta_domain", self.client.base_url())
                .with_detail("api_version", "v1");
                if let Some(email) = email {
                    result = result.with_detail("user_email", email);
                }
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "Okta connection test failed");
                Ok(HealthCheckResult::failure(format!("Okta connection failed: {}", e)))
            }
        }
    }

    #[instrument(skip(self), fields(source = %self.client.source_name()))]
    async fn fetch_users(&self) -> Result<Vec<Value>> {
        let options = RequestOptions::new()
            .query("limit", MAX_PAGE_SIZE.to_string())
            .query("filter", USER_STATUS_FILTER);

        let raw = self
            .client
            .collect_pages("/api/v1/users", options, &OktaPages)
            .await?;

        let users: Vec<Value> = raw
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<OktaUser>(record) {
                Ok(user) => Some(user.standardize()),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed Okta user");
                    None
                }
            })
            .collect();

        info!("Retrieved {} users from Okta", users.len());
        Ok(users)
    }

    async fn fetch_devices(&self) -> Result<Vec<Value>> {
        info!("Okta does not manage devices, skipping device fetch");
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::HttpRequest;
    use bytes::Bytes;
    use core_connector::ApiError;
    use mockall::mock;
    use mockall::Sequence;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn connection() -> ApiConnectionConfig {
        ApiConnectionConfig::new("Okta-Prod", ProviderKind::Okta, "https://corp.okta.test", 0)
    }

    fn credentials() -> Credentials {
        Credentials::from_pairs([("api_token", "00abc")])
    }

    fn connector(mock: MockHttpClient) -> OktaConnector {
        OktaConnector::from_connection(&connection(), &credentials(), Arc::new(mock), RetryPolicy::default())
            .unwrap()
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn test_missing_api_token() {
        let result = OktaConnector::from_connection(
            &connection(),
            &Credentials::default(),
            Arc::new(MockHttpClient::new()),
            RetryPolicy::default(),
        );

        assert!(matches!(result, Err(ApiError::Credentials(_))));
    }

    #[tokio::test]
    async fn test_connection_success() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.url, "https://corp.okta.test/api/v1/users/me");
            assert_eq!(req.headers.get("Authorization").map(String::as_str), Some("SSWS 00abc"));
            Ok(response(200, r#"{"id": "00u1", "profile": {"email": "admin@corp.example"}}"#))
        });

        let result = connector(mock_http).test_connection().await.unwrap();

        assert!(result.success);
        assert_eq!(result.message, "Connected to Okta as admin@corp.example");
        assert_eq!(result.details["okta_domain"], "https://corp.okta.test");
        assert_eq!(result.details["user_email"], "admin@corp.example");
    }

    #[tokio::test]
    async fn test_connection_rejected_token() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(401, "Invalid token provided")));

        let result = connector(mock_http).test_connection().await.unwrap();

        assert!(!result.success);
        assert_eq!(
            result.message,
            "Okta connection failed: Authentication failed: Invalid token provided"
        );
    }

    #[tokio::test]
    async fn test_fetch_users_follows_link_header() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = Sequence::new();

        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|req| {
                assert!(req.url.starts_with("https://corp.okta.test/api/v1/users?"));
                assert!(req.url.contains("limit=200"));
                assert!(req.url.contains("filter="));

                let mut page = response(
                    200,
                    r#"[
                        {"id": "00u1", "status": "ACTIVE", "profile": {"email": "a@corp.example", "firstName": "Ann", "lastName": "Lee"}},
                        {"id": "00u2", "status": "SUSPENDED", "profile": {"email": "b@corp.example"}}
                    ]"#,
                );
                page.headers.insert(
                    "link".to_string(),
                    r#"<https://corp.okta.test/api/v1/users?after=00u2&limit=200>; rel="next""#.to_string(),
                );
                Ok(page)
            });
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|req| {
                assert_eq!(req.url, "https://corp.okta.test/api/v1/users?after=00u2&limit=200");
                Ok(response(
                    200,
                    r#"[{"id": "00u3", "status": "LOCKED_OUT", "profile": {"email": "c@corp.example"}}]"#,
                ))
            });

        let users = connector(mock_http).fetch_users().await.unwrap();

        assert_eq!(users.len(), 3);
        assert_eq!(users[0]["full_name"], "Ann Lee");
        assert_eq!(users[0]["status"], "active");
        assert_eq!(users[1]["status"], "disabled");
        assert_eq!(users[2]["email"], "c@corp.example");
        assert_eq!(users[2]["status"], "disabled");
    }

    #[tokio::test]
    async fn test_fetch_users_http_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(403, "forbidden")));

        let err = connector(mock_http).fetch_users().await.unwrap_err();

        assert!(matches!(err, ApiError::Http { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_fetch_devices_is_empty() {
        let mock_http = MockHttpClient::new();

        let devices = connector(mock_http).fetch_devices().await.unwrap();

        assert!(devices.is_empty());
    }
}
