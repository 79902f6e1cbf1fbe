//! HTTP client for the Pulseboard REST API.
//!
//! `ApiClient` is plain transport: it never holds a credential itself.
//! Callers pass the bearer to use, and [`TransportGuard`](super::TransportGuard)
//! supplies it from the session for every resource request.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::{header, Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::identity::{
    AuthResponse, FederatedLoginInput, IdentityProvider, LoginInput, SignupInput,
};
use super::ApiError;
use crate::auth::Credential;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

const LOGIN_PATH: &str = "/auth/login";
const SIGNUP_PATH: &str = "/auth/signup";
const FEDERATED_PATH: &str = "/auth/oauth";
const SWITCH_WORKSPACE_PATH: &str = "/auth/switch-workspace";

/// API client for Pulseboard.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    initial_backoff: Duration,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override the first rate-limit backoff delay.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn auth_headers(bearer: Option<&Credential>) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = bearer {
            let mut value = header::HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                .context("Credential is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn parse_body<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<T> {
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;
        // Empty bodies (204, bare DELETE) deserialize as JSON null.
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON from {}: {}", url, e)).into()
        })
    }

    /// Send a JSON request, retrying on 429.
    ///
    /// `bearer` is called once per attempt so every attempt carries the
    /// credential current at the moment it is sent.
    pub async fn request<T, B, F>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        bearer: F,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
        F: Fn() -> Option<Credential>,
    {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let mut builder = self
                .client
                .request(method.clone(), &url)
                .header(header::ACCEPT, "application/json")
                .headers(Self::auth_headers(bearer().as_ref())?);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(ApiError::from)
                .with_context(|| format!("Failed to send {} request to {}", method, url))?;
            debug!(%method, url = %url, status = %response.status(), "Response received");

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Self::parse_body(response, &url).await,
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(
                        url = %url,
                        retry = retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    async fn post_auth<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&Credential>,
    ) -> Result<AuthResponse> {
        self.request(Method::POST, path, Some(body), || bearer.cloned())
            .await
    }
}

impl IdentityProvider for ApiClient {
    fn login<'a>(&'a self, input: &'a LoginInput) -> BoxFuture<'a, Result<AuthResponse>> {
        Box::pin(async move {
            self.post_auth(LOGIN_PATH, input, None)
                .await
                .context("Login request failed")
        })
    }

    fn signup<'a>(&'a self, input: &'a SignupInput) -> BoxFuture<'a, Result<AuthResponse>> {
        Box::pin(async move {
            self.post_auth(SIGNUP_PATH, input, None)
                .await
                .context("Signup request failed")
        })
    }

    fn federated_login<'a>(
        &'a self,
        input: &'a FederatedLoginInput,
    ) -> BoxFuture<'a, Result<AuthResponse>> {
        Box::pin(async move {
            let path = format!("{}/{}", FEDERATED_PATH, input.provider);
            self.post_auth(&path, input, None)
                .await
                .with_context(|| format!("{} sign-in request failed", input.provider))
        })
    }

    fn switch_workspace<'a>(
        &'a self,
        current: &'a Credential,
        workspace_id: i64,
    ) -> BoxFuture<'a, Result<AuthResponse>> {
        Box::pin(async move {
            let body = serde_json::json!({ "workspaceId": workspace_id });
            self.post_auth(SWITCH_WORKSPACE_PATH, &body, Some(current))
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::claims::testing::token_for_workspace;

    #[test]
    fn test_url_joining() {
        let api = ApiClient::new("https://api.example.com/v1/").unwrap();
        assert_eq!(api.base_url(), "https://api.example.com/v1");
        assert_eq!(api.url("/boards"), "https://api.example.com/v1/boards");
        assert_eq!(api.url("boards/3"), "https://api.example.com/v1/boards/3");
    }

    #[tokio::test]
    async fn test_login_posts_credentials_without_bearer() {
        let server = MockServer::start().await;
        let token = token_for_workspace(7);
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({ "email": "a@b.com", "password": "x" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": &token,
                "user": { "id": 1, "email": "a@b.com", "username": "alice" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        let input = LoginInput {
            email: "a@b.com".to_string(),
            password: "x".to_string(),
        };
        let response = api.login(&input).await.unwrap();

        assert_eq!(response.token.as_str(), token);
        assert_eq!(response.user.unwrap().id, 1);
        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_federated_login_uses_provider_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/oauth/github"))
            .and(body_json(json!({ "code": "abc", "redirectUri": "http://localhost/cb" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "t.u.v" })))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        let input = FederatedLoginInput {
            provider: "github".to_string(),
            code: "abc".to_string(),
            redirect_uri: Some("http://localhost/cb".to_string()),
        };
        let response = api.federated_login(&input).await.unwrap();
        assert_eq!(response.token.as_str(), "t.u.v");
        assert!(response.user.is_none());
    }

    #[tokio::test]
    async fn test_switch_workspace_sends_current_credential() {
        let server = MockServer::start().await;
        let current = Credential::new(token_for_workspace(7));
        Mock::given(method("POST"))
            .and(path("/auth/switch-workspace"))
            .and(header("authorization", format!("Bearer {}", current.as_str()).as_str()))
            .and(body_json(json!({ "workspaceId": 9 })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "token": token_for_workspace(9) })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        let response = api.switch_workspace(&current, 9).await.unwrap();
        assert_eq!(response.token.as_str(), token_for_workspace(9));
    }

    #[tokio::test]
    async fn test_error_status_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad password"))
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        let input = LoginInput {
            email: "a@b.com".to_string(),
            password: "wrong".to_string(),
        };
        let err = api.login(&input).await.unwrap_err();
        assert!(matches!(ApiError::find(&err), Some(ApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_rate_limited_request_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/boards"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/boards"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri())
            .unwrap()
            .with_initial_backoff(Duration::from_millis(5));
        let boards: serde_json::Value = api
            .request(Method::GET, "/boards", None::<&()>, || None)
            .await
            .unwrap();

        assert_eq!(boards, json!([{ "id": 1 }]));
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_body_parses_as_unit() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/boards/4"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri()).unwrap();
        api.request::<(), _, _>(Method::DELETE, "/boards/4", None::<&()>, || None)
            .await
            .unwrap();
    }
}
