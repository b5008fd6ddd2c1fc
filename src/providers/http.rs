use std::future::Future;
use std::time::{Duration, Instant};

use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Semaphore;
use url::Url;

use crate::auth::Token;
use crate::error::{CILensError, Result};
use crate::models::ProviderMetrics;

use super::metrics::MetricsRecorder;

const USER_AGENT: &str = concat!("cilens-sync/", env!("CARGO_PKG_VERSION"));
const MAX_CONCURRENT_REQUESTS: usize = 16;

/// How a provider expects credentials on the wire.
#[derive(Debug, Clone)]
pub enum ApiAuth {
    /// `Authorization: Bearer <token>`
    Bearer(Token),
    /// Token in a custom header, e.g. GitLab's `PRIVATE-TOKEN`
    Header { name: &'static str, token: Token },
    /// HTTP basic auth with a user API token (Jenkins)
    Basic { username: String, token: Token },
}

/// Authenticated HTTP client shared by the provider adapters.
///
/// Every outbound call is timed and recorded in the adapter's metrics before
/// its result is handed back, success or not. At most `MAX_CONCURRENT_REQUESTS`
/// calls are in flight at once; the rest wait for a permit.
pub struct ApiClient {
    client: Client,
    base_url: Url,
    auth: ApiAuth,
    timeout_ms: u64,
    metrics: MetricsRecorder,
    semaphore: Semaphore,
}

impl ApiClient {
    pub fn new(base_url: &str, auth: ApiAuth, timeout_ms: u64, accept: &'static str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(accept));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| CILensError::Configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
            auth,
            timeout_ms,
            metrics: MetricsRecorder::new(),
            semaphore: Semaphore::new(MAX_CONCURRENT_REQUESTS),
        })
    }

    pub fn metrics(&self) -> ProviderMetrics {
        self.metrics.snapshot()
    }

    /// Resolves a path relative to the API base URL.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| CILensError::Configuration(format!("Invalid API URL for '{path}': {e}")))
    }

    pub async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let request = self.authorize(self.client.get(self.url(path)?).query(query));
        self.track(async {
            let response = self.send(request).await?;
            response.json::<T>().await.map_err(|e| self.transport_error(e))
        })
        .await
    }

    pub async fn get_text(&self, path: &str) -> Result<String> {
        let request = self.authorize(self.client.get(self.url(path)?));
        self.track(async {
            let response = self.send(request).await?;
            response.text().await.map_err(|e| self.transport_error(e))
        })
        .await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.authorize(self.client.post(self.url(path)?).json(body));
        self.track(async {
            let response = self.send(request).await?;
            response.json::<T>().await.map_err(|e| self.transport_error(e))
        })
        .await
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            ApiAuth::Bearer(token) => request.bearer_auth(token.as_str()),
            ApiAuth::Header { name, token } => {
                request.header(HeaderName::from_static(*name), token.as_str())
            }
            ApiAuth::Basic { username, token } => request.basic_auth(username, Some(token.as_str())),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(CILensError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn track<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| CILensError::Configuration(format!("HTTP client closed: {e}")))?;

        let started = Instant::now();
        let result = call.await;
        let elapsed = started.elapsed();

        match &result {
            Ok(_) => self.metrics.record_success(elapsed),
            Err(err) => {
                debug!("API call failed after {}ms: {err}", elapsed.as_millis());
                self.metrics.record_failure(elapsed, err.to_string());
            }
        }

        result
    }

    fn transport_error(&self, err: reqwest::Error) -> CILensError {
        if err.is_timeout() {
            CILensError::Timeout(self.timeout_ms)
        } else {
            CILensError::Network(err)
        }
    }
}

/// Parses a base URL and makes sure it ends with `/` so relative joins append
/// instead of replacing the last segment.
pub fn parse_base_url(base_url: &str) -> Result<Url> {
    let mut normalized = base_url.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }

    Url::parse(&normalized).map_err(|e| CILensError::Configuration(format!("Invalid base URL: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> ApiClient {
        ApiClient::new(
            base_url,
            ApiAuth::Bearer(Token::from("t0ken")),
            2_000,
            "application/json",
        )
        .unwrap()
    }

    #[test]
    fn test_parse_base_url_appends_slash() {
        let url = parse_base_url("https://gitlab.example.com/api/v4").unwrap();
        assert_eq!(url.as_str(), "https://gitlab.example.com/api/v4/");
    }

    #[test]
    fn test_parse_base_url_rejects_garbage() {
        assert!(matches!(
            parse_base_url("not a url"),
            Err(CILensError::Configuration(_))
        ));
    }

    #[test]
    fn test_url_joins_relative_paths() {
        let client = client("https://api.github.com");
        let url = client.url("/repos/acme/widgets/actions/runs").unwrap();
        assert_eq!(url.as_str(), "https://api.github.com/repos/acme/widgets/actions/runs");
    }

    #[tokio::test]
    async fn test_get_json_sends_bearer_and_records_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .match_header("authorization", "Bearer t0ken")
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let client = client(&server.url());
        let body: serde_json::Value = client.get_json("ping", &[]).await.unwrap();

        mock.assert_async().await;
        assert_eq!(body["ok"], true);
        let metrics = client.metrics();
        assert_eq!(metrics.api_calls_count, 1);
        assert_eq!(metrics.error_count, 0);
    }

    #[tokio::test]
    async fn test_http_error_is_recorded_then_returned() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("Not Found")
            .create_async()
            .await;

        let client = client(&server.url());
        let err = client.get_text("missing").await.unwrap_err();

        assert!(matches!(err, CILensError::Api { status: 404, .. }));
        let metrics = client.metrics();
        assert_eq!(metrics.api_calls_count, 1);
        assert_eq!(metrics.error_count, 1);
        assert!(metrics.last_error.unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_calls_wait_for_a_free_permit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .with_status(200)
            .with_body("pong")
            .expect(1)
            .create_async()
            .await;

        let client = client(&server.url());
        let held = client
            .semaphore
            .acquire_many(MAX_CONCURRENT_REQUESTS as u32)
            .await
            .unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(200), client.get_text("ping")).await;
        assert!(blocked.is_err());
        assert_eq!(client.metrics().api_calls_count, 0);

        drop(held);
        assert_eq!(client.get_text("ping").await.unwrap(), "pong");
        mock.assert_async().await;
        assert_eq!(client.semaphore.available_permits(), MAX_CONCURRENT_REQUESTS);
    }

    #[tokio::test]
    async fn test_private_token_header_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/version")
            .match_header("private-token", "glpat-1")
            .with_status(200)
            .with_body(r#"{"version":"17.0.0"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(
            &server.url(),
            ApiAuth::Header {
                name: "private-token",
                token: Token::from("glpat-1"),
            },
            2_000,
            "application/json",
        )
        .unwrap();

        let _: serde_json::Value = client.get_json("version", &[]).await.unwrap();
        mock.assert_async().await;
    }
}
