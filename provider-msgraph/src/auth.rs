//! OAuth2 client-credentials authentication for Microsoft Graph.

use bridge_traits::http::{HttpMethod, HttpClient, RetryPolicy};
use bridge_traits::time::Clock;
use chrono::{DateTime, Duration, Utc};
use core_connector::{Credentials, RequestClient, RequestOptions, SlidingWindowLimiter};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::error::{GraphError, Result};
use crate::types::TokenResponse;

/// Microsoft identity platform authority
pub const LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";

/// Application permissions scope for Graph
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// App registration used for the client-credentials grant.
#[derive(Clone)]
pub struct GraphCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for GraphCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl GraphCredentials {
    /// # Errors
    ///
    /// Returns [`GraphError::MissingCredential`] for the first absent field.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        let field = |name: &'static str| {
            credentials
                .get(name)
                .map(str::to_string)
                .ok_or(GraphError::MissingCredential(name))
        };

        Ok(Self {
            tenant_id: field("tenant_id")?,
            client_id: field("client_id")?,
            client_secret: field("client_secret")?,
        })
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Returns true if the token is expired or will expire within the grace period.
    fn is_expired(&self, now: DateTime<Utc>, grace_period: Duration) -> bool {
        now + grace_period >= self.expires_at
    }
}

/// Token cache for one app registration.
pub struct TokenCache {
    credentials: GraphCredentials,
    client: RequestClient,
    clock: Arc<dyn Clock>,
    cached_token: RwLock<Option<CachedToken>>,
    /// Refresh this long before expiry (5 minutes)
    grace_period: Duration,
}

impl TokenCache {
    pub fn new(
        credentials: GraphCredentials,
        http: Arc<dyn HttpClient>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> core_connector::Result<Self> {
        let client = RequestClient::new(http, LOGIN_ENDPOINT, SlidingWindowLimiter::unlimited(), policy)?
            .with_source_name("Microsoft identity platform")
            .with_clock(Arc::clone(&clock));

        Ok(Self {
            credentials,
            client,
            clock,
            cached_token: RwLock::new(None),
            grace_period: Duration::minutes(5),
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.credentials.tenant_id
    }

    /// Gets a valid access token, refreshing if necessary.
    #[instrument(skip(self), fields(tenant_id = %self.credentials.tenant_id))]
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.cached_token.read().await;
            if let Some(token) = cache.as_ref() {
                if !token.is_expired(self.clock.now(), self.grace_period) {
                    debug!("Using cached token");
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut cache = self.cached_token.write().await;
        // Another caller may have refreshed while we waited for the lock
        if let Some(token) = cache.as_ref() {
            if !token.is_expired(self.clock.now(), self.grace_period) {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Refreshing access token");
        let token = self.acquire_token().await?;
        let access_token = token.access_token.clone();
        *cache = Some(token);
        Ok(access_token)
    }

    /// Drops the cached token, forcing a refresh on next use.
    pub async fn invalidate(&self) {
        *self.cached_token.write().await = None;
    }

    async fn acquire_token(&self) -> Result<CachedToken> {
        let form = serde_urlencoded::to_string([
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("scope", GRAPH_SCOPE),
        ])
        .map_err(|e| GraphError::TokenAcquisition(e.to_string()))?;

        let path = format!("/{}/oauth2/v2.0/token", self.credentials.tenant_id);
        let options = RequestOptions::new()
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(form);

        let response = self
            .client
            .execute(HttpMethod::Post, &path, options)
            .await
            .map_err(|e| GraphError::TokenAcquisition(e.to_string()))?;

        let token: TokenResponse = serde_json::from_slice(&response.body)
            .map_err(|e| GraphError::TokenResponse(e.to_string()))?;

        let expires_at = self.clock.now() + Duration::seconds(token.expires_in);
        debug!(
            "Acquired new token, expires at {}",
            expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at,
        })
    }
}
