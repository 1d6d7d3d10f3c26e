//! # Rate-Limited Request Client
//!
//! One instance per connection. Every send goes through the connection's
//! [`SlidingWindowLimiter`] and the shared [`RetryPolicy`]:
//!
//! | Outcome | Handling |
//! |---------|----------|
//! | Timeout / network error | Retry after `backoff_delay(attempt)` until `max_attempts` |
//! | HTTP 429 | Wait `Retry-After`, else `X-RateLimit-Reset - now`, else the default; does not use an attempt |
//! | HTTP 401 | [`ApiError::Authentication`], no retry |
//! | Other HTTP >= 400 | [`ApiError::Http`], no retry |
//!
//! Relative paths resolve against the connection's base URL; absolute URLs
//! (for example a `nextLink`) are used as given.

use crate::error::{ApiError, Result};
use crate::pagination::DEFAULT_MAX_PAGES;
use crate::rate_limiter::SlidingWindowLimiter;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::time::{Clock, SystemClock};
use bytes::Bytes;
use core_directory::ApiConnectionConfig;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Per-call request options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query parameters appended to the resolved URL
    pub query: Vec<(String, String)>,
    /// Headers added on top of the client's default headers
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.as_ref()))
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Same headers and body, no query parameters.
    pub(crate) fn without_query(&self) -> Self {
        Self {
            query: Vec::new(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

pub struct RequestClient {
    http: Arc<dyn HttpClient>,
    base_url: String,
    source_name: String,
    default_headers: HashMap<String, String>,
    limiter: SlidingWindowLimiter,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    pub(crate) max_pages: usize,
}

impl std::fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestClient")
            .field("base_url", &self.base_url)
            .field("source_name", &self.source_name)
            .field("limiter", &self.limiter)
            .field("policy", &self.policy)
            .field("max_pages", &self.max_pages)
            .finish_non_exhaustive()
    }
}

impl RequestClient {
    /// Create a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if `base_url` is not an absolute URL.
    pub fn new(
        http: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        limiter: SlidingWindowLimiter,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let base_url = base_url.into();
        Url::parse(&base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        Ok(Self {
            http,
            source_name: base_url.clone(),
            base_url,
            default_headers: HashMap::new(),
            limiter,
            policy,
            clock: Arc::new(SystemClock),
            max_pages: DEFAULT_MAX_PAGES,
        })
    }

    /// Client for a configured connection, rate limited by its budget.
    pub fn for_connection(
        connection: &ApiConnectionConfig,
        http: Arc<dyn HttpClient>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let client = Self::new(
            http,
            connection.base_url.clone(),
            SlidingWindowLimiter::for_connection(connection),
            policy,
        )?;
        Ok(client.with_source_name(connection.name.clone()))
    }

    /// Name used in log fields.
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    /// Header sent with every request (auth schemes with a static token).
    pub fn with_default_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    /// Clock used to evaluate `X-RateLimit-Reset`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Resolve `path` against the base URL and append `query`.
    pub fn resolve_url(&self, path: &str, query: &[(String, String)]) -> Result<String> {
        let joined = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        };

        let mut url =
            Url::parse(&joined).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", joined, e)))?;

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url.to_string())
    }

    /// Execute a request with rate limiting, retry and throttling
    ///
    /// # Errors
    ///
    /// See the module table; non-retryable bridge failures surface as
    /// [`ApiError::Bridge`].
    #[instrument(skip(self, options), fields(source = %self.source_name))]
    pub async fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        let url = self.resolve_url(path, &options.query)?;
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt: u32 = 0;
        let mut throttle_waits: u32 = 0;

        loop {
            self.limiter.acquire().await;

            let mut request = HttpRequest::new(method, url.clone())
                .headers(&self.default_headers)
                .headers(&options.headers)
                .timeout(self.policy.request_timeout);
            if let Some(body) = &options.body {
                request = request.body(body.clone());
            }

            match self.http.execute(request).await {
                Ok(response) if response.status == 429 => {
                    if throttle_waits >= self.policy.max_throttle_waits {
                        warn!(waits = throttle_waits, "Still rate limited, giving up");
                        return Err(ApiError::RateLimited {
                            waits: throttle_waits,
                        });
                    }
                    throttle_waits += 1;

                    let wait = self.throttle_wait(&response);
                    warn!(
                        wait_secs = wait.as_secs(),
                        waits = throttle_waits,
                        "Rate limited by remote API"
                    );
                    tokio::time::sleep(wait).await;
                }
                Ok(response) if response.status == 401 => {
                    warn!(%url, "Authentication failed");
                    return Err(ApiError::Authentication(body_text(&response)));
                }
                Ok(response) if response.status >= 400 => {
                    warn!(status = response.status, %url, "Request failed");
                    return Err(ApiError::Http {
                        status: response.status,
                        body: body_text(&response),
                    });
                }
                Ok(response) => {
                    debug!(status = response.status, attempt, "Request succeeded");
                    return Ok(response);
                }
                Err(e) if e.is_transient() => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        warn!(attempts = attempt, error = %e, "Request failed after retries");
                        return Err(ApiError::Transport {
                            attempts: attempt,
                            message: e.to_string(),
                        });
                    }

                    let delay = self.policy.backoff_delay(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient request failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(ApiError::Bridge(e)),
            }
        }
    }

    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.execute(HttpMethod::Get, path, options).await
    }

    /// GET and deserialize the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        let response = self.get(path, options).await?;
        parse_json(&response)
    }

    /// How long to wait after a 429.
    fn throttle_wait(&self, response: &HttpResponse) -> Duration {
        if let Some(seconds) = response
            .header("Retry-After")
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            return Duration::from_secs(seconds);
        }

        if let Some(reset) = response
            .header("X-RateLimit-Reset")
            .and_then(|v| v.trim().parse::<i64>().ok())
        {
            let remaining = (reset - self.clock.unix_timestamp()).max(1);
            return Duration::from_secs(remaining as u64);
        }

        self.policy.default_throttle_wait
    }
}

pub(crate) fn parse_json<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    serde_json::from_slice(&response.body).map_err(|e| ApiError::Parse(e.to_string()))
}

fn body_text(response: &HttpResponse) -> String {
    String::from_utf8_lossy(&response.body).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::time::FixedClock;
    use mockall::{mock, Sequence};
    use tokio::time::Instant;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn client(mock: MockHttpClient) -> RequestClient {
        RequestClient::new(
            Arc::new(mock),
            "https://api.example.com/",
            SlidingWindowLimiter::unlimited(),
            RetryPolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_url() {
        let client = client(MockHttpClient::new());

        assert_eq!(
            client.resolve_url("/api/v1/users", &[]).unwrap(),
            "https://api.example.com/api/v1/users"
        );
        assert_eq!(
            client
                .resolve_url(
                    "api/v1/users",
                    &[("limit".to_string(), "200".to_string())]
                )
                .unwrap(),
            "https://api.example.com/api/v1/users?limit=200"
        );
        assert_eq!(
            client
                .resolve_url("https://other.example.com/page?cursor=abc", &[])
                .unwrap(),
            "https://other.example.com/page?cursor=abc"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = RequestClient::new(
            Arc::new(MockHttpClient::new()),
            "not a url",
            SlidingWindowLimiter::unlimited(),
            RetryPolicy::default(),
        );
        assert!(matches!(result, Err(ApiError::InvalidUrl(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_back_off_then_succeed() {
        let mut mock = MockHttpClient::new();
        let mut seq = Sequence::new();
        mock.expect_execute()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(BridgeError::Timeout("timed out".to_string())));
        mock.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(200, "[]")));

        let client = client(mock);
        let start = Instant::now();
        let response = client.get("/users", RequestOptions::new()).await.unwrap();

        assert_eq!(response.status, 200);
        // Two backoff waits: 1s then 2s.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_exhaust_attempts() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(3)
            .returning(|_| Err(BridgeError::Network("connection refused".to_string())));

        let result = client(mock).get("/users", RequestOptions::new()).await;
        assert!(matches!(result, Err(ApiError::Transport { attempts: 3, .. })));
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(401, "invalid token")));

        let result = client(mock).get("/users", RequestOptions::new()).await;
        match result {
            Err(ApiError::Authentication(body)) => assert_eq!(body, "invalid token"),
            other => panic!("expected authentication error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(404, "missing")));

        let result = client(mock).get("/users", RequestOptions::new()).await;
        assert!(matches!(result, Err(ApiError::Http { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_non_transient_bridge_error_is_not_retried() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Err(BridgeError::OperationFailed("bad request".to_string())));

        let result = client(mock).get("/users", RequestOptions::new()).await;
        assert!(matches!(result, Err(ApiError::Bridge(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_honours_retry_after_without_using_attempts() {
        let mut mock = MockHttpClient::new();
        let mut seq = Sequence::new();
        mock.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(BridgeError::Timeout("slow".to_string())));
        mock.expect_execute()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(429, "").with_header("Retry-After", "5")));
        mock.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(BridgeError::Timeout("slow".to_string())));
        mock.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(200, "{}")));

        let client = client(mock);
        let start = Instant::now();
        let response = client.get("/users", RequestOptions::new()).await.unwrap();

        assert_eq!(response.status, 200);
        // 1s backoff, two 5s throttle waits, 2s backoff.
        assert_eq!(start.elapsed(), Duration::from_secs(13));
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_uses_rate_limit_reset_header() {
        let mut mock = MockHttpClient::new();
        let mut seq = Sequence::new();
        mock.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(HttpResponse::new(429, "").with_header("x-ratelimit-reset", "1000030"))
            });
        mock.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(200, "{}")));

        let client = client(mock).with_clock(Arc::new(FixedClock::at_unix(1_000_000)));
        let start = Instant::now();
        client.get("/users", RequestOptions::new()).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_reset_in_past_waits_one_second() {
        let mut mock = MockHttpClient::new();
        let mut seq = Sequence::new();
        mock.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(429, "").with_header("X-RateLimit-Reset", "10")));
        mock.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(200, "{}")));

        let client = client(mock).with_clock(Arc::new(FixedClock::at_unix(1_000_000)));
        let start = Instant::now();
        client.get("/users", RequestOptions::new()).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_without_headers_uses_default_and_is_bounded() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(4)
            .returning(|_| Ok(HttpResponse::new(429, "slow down")));

        let client = client(mock);
        let start = Instant::now();
        let result = client.get("/users", RequestOptions::new()).await;

        assert!(matches!(result, Err(ApiError::RateLimited { waits: 3 })));
        assert_eq!(start.elapsed(), Duration::from_secs(180));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_respect_rate_limit() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(3)
            .returning(|_| Ok(HttpResponse::new(200, "{}")));

        let client = RequestClient::new(
            Arc::new(mock),
            "https://api.example.com",
            SlidingWindowLimiter::new(2, Duration::from_secs(60)),
            RetryPolicy::default(),
        )
        .unwrap();

        let start = Instant::now();
        client.get("/a", RequestOptions::new()).await.unwrap();
        client.get("/b", RequestOptions::new()).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        client.get("/c", RequestOptions::new()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_headers_are_merged() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|request| {
            assert_eq!(
                request.headers.get("Authorization"),
                Some(&"SSWS token".to_string())
            );
            assert_eq!(request.headers.get("X-Trace"), Some(&"1".to_string()));
            assert_eq!(request.timeout, Some(Duration::from_secs(30)));
            Ok(HttpResponse::new(200, r#"{"id":"me"}"#))
        });

        let client = client(mock).with_default_header("Authorization", "SSWS token");
        let body: serde_json::Value = client
            .get_json("/me", RequestOptions::new().header("X-Trace", "1"))
            .await
            .unwrap();
        assert_eq!(body["id"], "me");
    }

    #[tokio::test]
    async fn test_unparsable_body() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, "<html>")));

        let result: Result<serde_json::Value> =
            client(mock).get_json("/me", RequestOptions::new()).await;
        assert!(matches!(result, Err(ApiError::Parse(_))));
    }
}
