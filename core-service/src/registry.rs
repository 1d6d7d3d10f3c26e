//! Provider registry
//!
//! Maps a connection's provider kind onto a concrete connector. Provider
//! kinds without an adapter fail with `ApiError::UnsupportedProvider`, which
//! the orchestrator reports as "not implemented".

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, RetryPolicy};
use bridge_traits::time::Clock;
use core_connector::{
    ApiError, Connector, ConnectorFactory, CredentialResolver, PlaintextCredentialResolver,
    Result, DEFAULT_MAX_PAGES,
};
use core_directory::{ApiConnectionConfig, ProviderKind};
use core_runtime::CoreConfig;
use provider_msgraph::MsGraphConnector;
use provider_okta::OktaConnector;
use std::sync::Arc;
use tracing::debug;

pub struct ProviderRegistry {
    http: Arc<dyn HttpClient>,
    credentials: Arc<dyn CredentialResolver>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    max_pages: usize,
}

impl ProviderRegistry {
    pub fn new(http: Arc<dyn HttpClient>, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            http,
            credentials: Arc::new(PlaintextCredentialResolver),
            policy,
            clock,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(
            Arc::clone(&config.http_client),
            config.retry_policy.clone(),
            Arc::clone(&config.clock),
        )
        .with_max_pages(config.max_pages)
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Replace the plaintext resolver, e.g. with one that decrypts at rest.
    pub fn with_credential_resolver(mut self, resolver: Arc<dyn CredentialResolver>) -> Self {
        self.credentials = resolver;
        self
    }

    /// Whether a connector exists for `provider`.
    pub fn supports(provider: ProviderKind) -> bool {
        matches!(
            provider,
            ProviderKind::Okta | ProviderKind::AzureAd | ProviderKind::Intune
        )
    }
}

#[async_trait]
impl ConnectorFactory for ProviderRegistry {
    async fn create(&self, connection: &ApiConnectionConfig) -> Result<Arc<dyn Connector>> {
        debug!(
            connection_id = %connection.id,
            provider = connection.provider.as_str(),
            "Resolving connector"
        );

        match connection.provider {
            ProviderKind::Okta => {
                let credentials = self.credentials.resolve(connection).await?;
                let connector = OktaConnector::from_connection(
                    connection,
                    &credentials,
                    Arc::clone(&self.http),
                    self.policy.clone(),
                )?
                .with_max_pages(self.max_pages);
                Ok(Arc::new(connector))
            }
            ProviderKind::AzureAd | ProviderKind::Intune => {
                let credentials = self.credentials.resolve(connection).await?;
                let connector = MsGraphConnector::from_connection(
                    connection,
                    &credentials,
                    Arc::clone(&self.http),
                    self.policy.clone(),
                    Arc::clone(&self.clock),
                )?
                .with_max_pages(self.max_pages);
                Ok(Arc::new(connector))
            }
            ProviderKind::CrowdStrike
            | ProviderKind::Workday
            | ProviderKind::BambooHr
            | ProviderKind::Jamf
            | ProviderKind::Custom => Err(ApiError::UnsupportedProvider(
                connection.provider.as_str().to_string(),
            )),
        }
    }
}
