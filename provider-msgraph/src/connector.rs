//! Microsoft Graph connector
//!
//! Users come from `/v1.0/users`, devices from Intune's
//! `/v1.0/deviceManagement/managedDevices`. Every request carries a bearer
//! token from the [`TokenCache`].

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, RetryPolicy};
use bridge_traits::time::Clock;
use core_connector::{
    ApiError, Connector, Credentials, HealthCheckResult, PageExtractor, RequestClient,
    RequestOptions, Result,
};
use core_directory::{ApiConnectionConfig, ProviderKind};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::auth::{GraphCredentials, TokenCache};
use crate::types::{Collection, GraphUser, ManagedDevice, Organization};

/// Maximum results per page (Graph limit for users)
const MAX_PAGE_SIZE: u32 = 999;

const USER_FIELDS: &str = "id,userPrincipalName,displayName,givenName,surname,mail,jobTitle,department,officeLocation,manager,accountEnabled,createdDateTime,lastSignInDateTime,userType";

const DEVICE_FIELDS: &str = "id,deviceName,operatingSystem,osVersion,deviceType,complianceState,lastSyncDateTime,enrolledDateTime,userPrincipalName,model,manufacturer";

/// Graph collections live under `value`; `@odata.nextLink` is found by the
/// default next-page lookup.
struct GraphPages;

impl PageExtractor for GraphPages {
    fn records(&self, body: &Value) -> Vec<Value> {
        body.get("value")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }
}

/// Microsoft Graph (Azure AD / Intune) connector
pub struct MsGraphConnector {
    provider: ProviderKind,
    client: RequestClient,
    tokens: TokenCache,
}

impl MsGraphConnector {
    pub fn new(provider: ProviderKind, client: RequestClient, tokens: TokenCache) -> Self {
        Self {
            provider,
            client,
            tokens,
        }
    }

    /// # Errors
    ///
    /// Returns `ApiError::Credentials` when `tenant_id`, `client_id` or
    /// `client_secret` is missing.
    pub fn from_connection(
        connection: &ApiConnectionConfig,
        credentials: &Credentials,
        http: Arc<dyn HttpClient>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let graph_credentials = GraphCredentials::from_credentials(credentials)?;
        let tokens = TokenCache::new(graph_credentials, Arc::clone(&http), policy.clone(), Arc::clone(&clock))?;
        let client = RequestClient::for_connection(connection, http, policy)?
            .with_clock(clock)
            .with_default_header("Accept", "application/json")
            .with_default_header("ConsistencyLevel", "eventual");

        Ok(Self::new(connection.provider, client, tokens))
    }

    /// Cap on pages followed per listing.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.client = self.client.with_max_pages(max_pages);
        self
    }

    async fn authorized(&self, options: RequestOptions) -> Result<RequestOptions> {
        let token = self.tokens.get_token().await?;
        Ok(options.bearer_token(token))
    }

    /// Walk a Graph collection and convert each entry with `standardize`.
    async fn collect<T, F>(&self, path: &str, select: &str, standardize: F) -> Result<Vec<Value>>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> Value,
    {
        let options = self
            .authorized(
                RequestOptions::new()
                    .query("$select", select)
                    .query("$top", MAX_PAGE_SIZE.to_string()),
            )
            .await?;

        let raw = match self.client.collect_pages(path, options, &GraphPages).await {
            Ok(raw) => raw,
            Err(e) => {
                if e.is_authentication() {
                    self.tokens.invalidate().await;
                }
                return Err(e);
            }
        };

        Ok(raw
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<T>(record) {
                Ok(item) => Some(standardize(&item)),
                Err(e) => {
                    warn!(error = %e, path, "Skipping malformed Graph record");
                    None
                }
            })
            .collect())
    }

    async fn probe(&self) -> Result<Organization> {
        let options = self.authorized(RequestOptions::new()).await?;
        let organizations: Collection<Organization> =
            self.client.get_json("/v1.0/organization", options).await?;
        organizations
            .value
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Parse("organization list is empty".to_string()))
    }
}

#[async_trait]
impl Connector for MsGraphConnector {
    fn provider(&self) -> ProviderKind {
        self.provider
    }

    #[instrument(skip(self), fields(source = %self.client.source_name()))]
    async fn test_connection(&self) -> Result<HealthCheckResult> {
        match self.probe().await {
            Ok(organization) => {
                info!("Microsoft Graph connection verified");
                Ok(HealthCheckResult::success("Microsoft Graph connection successful")
                    .with_detail(
                        "display_name",
                        organization.display_name.as_deref().unwrap_or("Unknown"),
                    )
                    .with_detail("tenant_id", self.tokens.tenant_id())
                    .with_detail("verified_domains", organization.verified_domains.len()))
            }
            Err(e) => {
                warn!(error = %e, "Microsoft Graph connection test failed");
                Ok(HealthCheckResult::failure(format!("Connection failed: {}", e)))
            }
        }
    }

    #[instrument(skip(self), fields(source = %self.client.source_name()))]
    async fn fetch_users(&self) -> Result<Vec<Value>> {
        let users = self
            .collect("/v1.0/users", USER_FIELDS, GraphUser::standardize)
            .await?;
        info!("Successfully retrieved {} users from Microsoft Graph", users.len());
        Ok(users)
    }

    #[instrument(skip(self), fields(source = %self.client.source_name()))]
    async fn fetch_devices(&self) -> Result<Vec<Value>> {
        let devices = self
            .collect(
                "/v1.0/deviceManagement/managedDevices",
                DEVICE_FIELDS,
                ManagedDevice::standardize,
            )
            .await?;
        info!("Successfully retrieved {} devices from Microsoft Graph", devices.len());
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use bridge_traits::time::FixedClock;
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    const TOKEN_URL: &str = "https://login.microsoftonline.com/contoso/oauth2/v2.0/token";

    fn connection() -> ApiConnectionConfig {
        ApiConnectionConfig::new("Azure AD", ProviderKind::AzureAd, "https://graph.microsoft.com", 0)
    }

    fn credentials() -> Credentials {
        Credentials::from_pairs([
            ("tenant_id", "contoso"),
            ("client_id", "app-1"),
            ("client_secret", "secret"),
        ])
    }

    /// Mock answering the token endpoint and delegating Graph calls to `graph`.
    fn mock_with<F>(graph: F) -> MockHttpClient
    where
        F: Fn(&HttpRequest) -> HttpResponse + Send + 'static,
    {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().returning(move |req| {
            if req.url == TOKEN_URL {
                return Ok(HttpResponse::new(
                    200,
                    r#"{"access_token": "graph-token", "expires_in": 3600}"#,
                ));
            }
            assert_eq!(
                req.headers.get("Authorization").map(String::as_str),
                Some("Bearer graph-token")
            );
            Ok(graph(&req))
        });
        mock_http
    }

    fn connector(mock: MockHttpClient) -> MsGraphConnector {
        MsGraphConnector::from_connection(
            &connection(),
            &credentials(),
            Arc::new(mock),
            RetryPolicy::default(),
            Arc::new(FixedClock::at_unix(1_700_000_000)),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_credentials() {
        let result = MsGraphConnector::from_connection(
            &connection(),
            &Credentials::from_pairs([("tenant_id", "contoso")]),
            Arc::new(MockHttpClient::new()),
            RetryPolicy::default(),
            Arc::new(FixedClock::at_unix(0)),
        );

        match result {
            Err(ApiError::Credentials(message)) => {
                assert_eq!(message, "Microsoft Graph credential 'client_id' not found")
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_connection_reports_tenant() {
        let mock_http = mock_with(|req| {
            assert_eq!(req.url, "https://graph.microsoft.com/v1.0/organization");
            HttpResponse::new(
                200,
                r#"{"value": [{"displayName": "Contoso", "verifiedDomains": [{"name": "contoso.com"}, {"name": "contoso.onmicrosoft.com"}]}]}"#,
            )
        });

        let result = connector(mock_http).test_connection().await.unwrap();

        assert!(result.success);
        assert_eq!(result.message, "Microsoft Graph connection successful");
        assert_eq!(result.details["display_name"], "Contoso");
        assert_eq!(result.details["tenant_id"], "contoso");
        assert_eq!(result.details["verified_domains"], 2);
    }

    #[tokio::test]
    async fn test_connection_token_failure() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(400, "invalid_client")));

        let result = connector(mock_http).test_connection().await.unwrap();

        assert!(!result.success);
        assert_eq!(
            result.message,
            "Connection failed: Authentication failed: Token acquisition failed: HTTP 400: invalid_client"
        );
    }

    #[tokio::test]
    async fn test_fetch_users_follows_next_link() {
        let mock_http = mock_with(|req| {
            if req.url.contains("skiptoken") {
                HttpResponse::new(
                    200,
                    r#"{"value": [{"userPrincipalName": "c@contoso.com", "displayName": "Cee", "accountEnabled": false}]}"#,
                )
            } else {
                assert!(req.url.starts_with("https://graph.microsoft.com/v1.0/users?"));
                assert!(req.url.contains("%24top=999"));
                assert!(req.url.contains("%24select="));
                HttpResponse::new(
                    200,
                    r#"{
                        "value": [
                            {"mail": "a@contoso.com", "displayName": "Ay", "department": "Finance"},
                            {"userPrincipalName": "b@contoso.com", "displayName": "Bee"}
                        ],
                        "@odata.nextLink": "https://graph.microsoft.com/v1.0/users?$skiptoken=X1"
                    }"#,
                )
            }
        });

        let users = connector(mock_http).fetch_users().await.unwrap();

        assert_eq!(users.len(), 3);
        assert_eq!(users[0]["email"], "a@contoso.com");
        assert_eq!(users[0]["department"], "Finance");
        assert_eq!(users[1]["email"], "b@contoso.com");
        assert_eq!(users[2]["accountEnabled"], false);
        assert_eq!(users[2]["source_system"], "Microsoft Graph");
    }

    #[tokio::test]
    async fn test_fetch_managed_devices() {
        let mock_http = mock_with(|req| {
            assert!(req
                .url
                .starts_with("https://graph.microsoft.com/v1.0/deviceManagement/managedDevices?"));
            HttpResponse::new(
                200,
                r#"{"value": [
                    {"deviceName": "LAPTOP-A", "complianceState": "compliant", "userPrincipalName": "a@contoso.com"},
                    {"deviceName": "LAPTOP-B", "complianceState": "noncompliant"}
                ]}"#,
            )
        });

        let devices = connector(mock_http).fetch_devices().await.unwrap();

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0]["name"], "LAPTOP-A");
        assert_eq!(devices[0]["compliant"], true);
        assert_eq!(devices[0]["user_principal_name"], "a@contoso.com");
        assert_eq!(devices[1]["compliant"], false);
    }
}
