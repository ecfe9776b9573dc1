//! HTTP client shared by the registry and Harbor sources
//!
//! - Basic auth on the configured origin only; redirects are followed by hand
//!   and never carry credentials to another origin
//! - Bearer token exchange on a `WWW-Authenticate: Bearer` challenge
//! - Registry error bodies are decoded into structured codes

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, LOCATION, RETRY_AFTER, WWW_AUTHENTICATE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::config::{Endpoint, Scheme};
use crate::credentials::{Credentials, same_origin};
use crate::error::{RepoError, Result};

const MAX_REDIRECTS: u32 = 10;

/// Registry error body: `{"errors": [{"code": "...", "message": "..."}]}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryErrors {
    #[serde(default)]
    pub errors: Vec<RegistryErrorEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryErrorEntry {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Registry codes that mean "this caller may not see this artifact"
pub const SKIP_CODES: &[&str] = &[
    "UNAUTHORIZED",
    "DENIED",
    "NAME_UNKNOWN",
    "MANIFEST_UNKNOWN",
    "PROJECT_POLICY_VIOLATION",
];

/// HTTP client bound to one backend origin
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
    timeout: Duration,
    bearer: Mutex<Option<String>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.credentials.is_some())
            .finish()
    }
}

impl ApiClient {
    /// Create a client for `base_url` (`scheme://host[:port]`)
    pub fn new(
        base_url: impl Into<String>,
        credentials: Option<Credentials>,
        insecure_skip_tls: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let client = build_client(insecure_skip_tls, timeout)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            timeout,
            bearer: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Absolute URL for a path relative to the base URL
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// GET a path; non-success statuses are turned into errors
    pub async fn get(&self, path: &str) -> Result<Response> {
        self.get_with_accept(path, None).await
    }

    /// GET a path with an explicit `Accept` header
    pub async fn get_with_accept(&self, path: &str, accept: Option<&str>) -> Result<Response> {
        let url = self.url(path);
        let response = self.send(&url, accept, self.stored_bearer()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        // One token exchange per challenge, then one retry
        let Some(challenge) = bearer_challenge(response.headers()) else {
            return check_status(response).await;
        };
        let token = self.exchange_token(&challenge).await?;
        if let Ok(mut guard) = self.bearer.lock() {
            *guard = Some(token.clone());
        }
        let response = self.send(&url, accept, Some(token)).await?;
        check_status(response).await
    }

    /// GET and decode a JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.get(path).await?;
        let bytes = self.read_body(response).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// GET a raw body
    pub async fn get_bytes(&self, path: &str, accept: Option<&str>) -> Result<Vec<u8>> {
        let response = self.get_with_accept(path, accept).await?;
        self.read_body(response).await
    }

    /// Read a response body, mapping read timeouts to the configured limit
    pub async fn read_body(&self, response: Response) -> Result<Vec<u8>> {
        let bytes = response.bytes().await.map_err(|e| self.map_error(e))?;
        Ok(bytes.to_vec())
    }

    fn stored_bearer(&self) -> Option<String> {
        self.bearer.lock().ok().and_then(|guard| guard.clone())
    }

    /// Send a GET, following redirects without leaking credentials
    async fn send(&self, url: &str, accept: Option<&str>, bearer: Option<String>) -> Result<Response> {
        let mut current_url = url.to_string();
        let mut redirects = 0;

        loop {
            let mut request = self.client.get(&current_url);
            if let Some(accept) = accept {
                request = request.header(ACCEPT, accept);
            }

            if same_origin(&self.base_url, &current_url) {
                if let Some(token) = &bearer {
                    request = request.header(AUTHORIZATION, format!("Bearer {}", token));
                } else if let Some(creds) = &self.credentials {
                    request = request.header(AUTHORIZATION, creds.auth_header());
                }
            } else if self.credentials.is_some() || bearer.is_some() {
                tracing::debug!(
                    from = %self.base_url,
                    to = %current_url,
                    "cross-origin redirect, credentials not forwarded"
                );
            }

            let response = request.send().await.map_err(|e| self.map_error(e))?;
            if !response.status().is_redirection() {
                return Ok(response);
            }

            redirects += 1;
            if redirects > MAX_REDIRECTS {
                return Err(RepoError::NetworkError {
                    message: format!("Too many redirects (max {})", MAX_REDIRECTS),
                });
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| RepoError::NetworkError {
                    message: "Redirect without Location header".to_string(),
                })?;
            let base = Url::parse(&current_url)?;
            current_url = base.join(location)?.to_string();
        }
    }

    /// Fetch a bearer token from the challenge realm
    async fn exchange_token(&self, challenge: &HashMap<String, String>) -> Result<String> {
        let realm = challenge.get("realm").ok_or_else(|| RepoError::AuthFailed {
            message: "Bearer challenge without realm".to_string(),
        })?;
        let mut url = Url::parse(realm)?;
        {
            let mut query = url.query_pairs_mut();
            for key in ["service", "scope"] {
                if let Some(value) = challenge.get(key) {
                    query.append_pair(key, value);
                }
            }
        }

        let mut request = self.client.get(url.as_str());
        if let Some(creds) = &self.credentials {
            request = request.header(AUTHORIZATION, creds.auth_header());
        }
        let response = request.send().await.map_err(|e| self.map_error(e))?;
        let response = check_status(response).await?;

        #[derive(Deserialize)]
        struct TokenResponse {
            #[serde(default)]
            token: Option<String>,
            #[serde(default)]
            access_token: Option<String>,
        }

        let body: TokenResponse = serde_json::from_slice(&self.read_body(response).await?)?;
        body.token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RepoError::AuthFailed {
                message: format!("Token endpoint {} returned no token", realm),
            })
    }

    fn map_error(&self, e: reqwest::Error) -> RepoError {
        if e.is_timeout() {
            RepoError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            RepoError::from(e)
        }
    }
}

fn build_client(insecure_skip_tls: bool, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(insecure_skip_tls)
        .timeout(timeout)
        .user_agent(concat!("ocichart/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| RepoError::NetworkError {
            message: e.to_string(),
        })
}

/// Turn a non-success response into a typed error
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        return Err(RepoError::RateLimited { retry_after });
    }

    let body = response.bytes().await.unwrap_or_default();
    Err(status_error(status, &url, &body))
}

/// Map a failed status and its body to an error, preferring registry codes
pub fn status_error(status: StatusCode, url: &str, body: &[u8]) -> RepoError {
    let registry_error = serde_json::from_slice::<RegistryErrors>(body)
        .ok()
        .and_then(|errors| errors.errors.into_iter().find(|e| !e.code.is_empty()));

    if let Some(entry) = registry_error {
        if status.is_client_error() {
            return RepoError::Denied {
                status: status.as_u16(),
                code: entry.code,
                message: entry.message,
            };
        }
        return RepoError::HttpError {
            status: status.as_u16(),
            message: format!("{}: {}", entry.code, entry.message),
        };
    }

    match status {
        StatusCode::UNAUTHORIZED => RepoError::AuthRequired {
            url: url.to_string(),
        },
        StatusCode::FORBIDDEN => RepoError::AuthFailed {
            message: format!("Access denied to {}", url),
        },
        _ => RepoError::HttpError {
            status: status.as_u16(),
            message: format!("Request to {} failed", url),
        },
    }
}

/// Parameters of a `WWW-Authenticate: Bearer k="v",...` challenge
pub fn bearer_challenge(headers: &HeaderMap) -> Option<HashMap<String, String>> {
    let value = headers.get(WWW_AUTHENTICATE)?.to_str().ok()?;
    let (scheme, params) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut parsed = HashMap::new();
    let mut rest = params.trim();
    while !rest.is_empty() {
        let (key, after_key) = rest.split_once('=')?;
        let after_key = after_key.trim_start();
        let (value, remainder) = match after_key.strip_prefix('"') {
            Some(quoted) => {
                let end = quoted.find('"')?;
                (&quoted[..end], &quoted[end + 1..])
            }
            None => match after_key.find(',') {
                Some(end) => (&after_key[..end], &after_key[end..]),
                None => (after_key, ""),
            },
        };
        parsed.insert(key.trim().to_ascii_lowercase(), value.to_string());
        rest = remainder.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
    }
    Some(parsed)
}

/// Target of a `Link: <...>; rel="next"` header
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(reqwest::header::LINK)?.to_str().ok()?;
    value.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.contains("rel=\"next\"") && !params.contains("rel=next") {
            return None;
        }
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        Some(target.to_string())
    })
}

/// Pick a scheme for the endpoint: declared one, else `https` if `/v2/`
/// answers over TLS, else `http`
pub async fn resolve_scheme(endpoint: &Endpoint, timeout: Duration) -> Result<Scheme> {
    if let Some(scheme) = endpoint.declared_scheme() {
        return Ok(scheme);
    }

    let client = build_client(endpoint.insecure_skip_tls, timeout)?;
    let probe = format!("{}/v2/", endpoint.base_url(Scheme::Https)?);
    match client.get(&probe).send().await {
        Ok(_) => Ok(Scheme::Https),
        Err(e) => {
            tracing::warn!(url = %probe, error = %e, "https unreachable, falling back to plain http");
            Ok(Scheme::Http)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_status_error_uses_registry_code() {
        let body = br#"{"errors":[{"code":"PROJECT_POLICY_VIOLATION","message":"not signed"}]}"#;
        match status_error(StatusCode::PRECONDITION_FAILED, "http://r/v2/x", body) {
            RepoError::Denied { status, code, .. } => {
                assert_eq!(status, 412);
                assert_eq!(code, "PROJECT_POLICY_VIOLATION");
            }
            other => panic!("Expected Denied, got {:?}", other),
        }

        // Same text without a structured body is not a policy error
        let err = status_error(StatusCode::BAD_GATEWAY, "http://r", b"PROJECT_POLICY_VIOLATION");
        assert!(matches!(err, RepoError::HttpError { status: 502, .. }));

        let err = status_error(StatusCode::UNAUTHORIZED, "http://r", b"");
        assert!(matches!(err, RepoError::AuthRequired { .. }));
    }

    #[test]
    fn test_bearer_challenge_parse() {
        let mut headers = HeaderMap::new();
        headers.insert(
            WWW_AUTHENTICATE,
            HeaderValue::from_static(
                r#"Bearer realm="https://auth.example.com/token",service="registry",scope="repository:a/b:pull""#,
            ),
        );
        let challenge = bearer_challenge(&headers).unwrap();
        assert_eq!(challenge["realm"], "https://auth.example.com/token");
        assert_eq!(challenge["service"], "registry");
        assert_eq!(challenge["scope"], "repository:a/b:pull");

        headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Basic realm=\"x\""));
        assert!(bearer_challenge(&headers).is_none());
    }

    #[test]
    fn test_next_link() {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::LINK,
            HeaderValue::from_static(r#"</v2/_catalog?last=b&n=2>; rel="next""#),
        );
        assert_eq!(next_link(&headers).unwrap(), "/v2/_catalog?last=b&n=2");
        assert!(next_link(&HeaderMap::new()).is_none());
    }

    #[tokio::test]
    async fn test_basic_auth_sent_to_origin() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2.0/projects"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(
            server.uri(),
            Some(Credentials::new("user", "pass")),
            false,
            Duration::from_secs(5),
        )
        .unwrap();
        let projects: Vec<serde_json::Value> = client.get_json("/api/v2.0/projects").await.unwrap();
        assert!(projects.is_empty());
    }

    #[tokio::test]
    async fn test_cross_origin_redirect_drops_credentials() {
        let origin = MockServer::start().await;
        let storage = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/a/blobs/sha256:1"))
            .respond_with(
                ResponseTemplate::new(307)
                    .insert_header("Location", format!("{}/blob", storage.uri()).as_str()),
            )
            .mount(&origin)
            .await;
        Mock::given(method("GET"))
            .and(path("/blob"))
            .respond_with(|req: &wiremock::Request| {
                if req.headers.contains_key("authorization") {
                    ResponseTemplate::new(400)
                } else {
                    ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec())
                }
            })
            .mount(&storage)
            .await;

        let client = ApiClient::new(
            origin.uri(),
            Some(Credentials::new("user", "pass")),
            false,
            Duration::from_secs(5),
        )
        .unwrap();
        let body = client.get_bytes("/v2/a/blobs/sha256:1", None).await.unwrap();
        assert_eq!(body, b"payload");
    }

    #[tokio::test]
    async fn test_bearer_exchange() {
        let server = MockServer::start().await;
        let challenge = format!(
            r#"Bearer realm="{}/token",service="registry",scope="registry:catalog:*""#,
            server.uri()
        );

        Mock::given(method("GET"))
            .and(path("/v2/_catalog"))
            .and(header("authorization", "Bearer t0k3n"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"repositories":[]}"#))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/_catalog"))
            .respond_with(
                ResponseTemplate::new(401).insert_header("WWW-Authenticate", challenge.as_str()),
            )
            .with_priority(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token":"t0k3n"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), None, false, Duration::from_secs(5)).unwrap();
        let body: serde_json::Value = client.get_json("/v2/_catalog").await.unwrap();
        assert!(body["repositories"].as_array().unwrap().is_empty());

        // Stored token is reused without another exchange
        let _: serde_json::Value = client.get_json("/v2/_catalog").await.unwrap();
    }

    #[tokio::test]
    async fn test_declared_scheme_skips_probe() {
        let endpoint = Endpoint::new("http://127.0.0.1:1");
        let scheme = resolve_scheme(&endpoint, Duration::from_millis(100)).await.unwrap();
        assert_eq!(scheme, Scheme::Http);
    }

    #[tokio::test]
    async fn test_https_failure_falls_back_to_http() {
        let server = MockServer::start().await;
        let endpoint = Endpoint::new(server.address().to_string());

        let scheme = resolve_scheme(&endpoint, Duration::from_secs(2)).await.unwrap();
        assert_eq!(scheme, Scheme::Http);
    }
}
