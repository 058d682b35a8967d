//! Stern Insider Connected API client
//!
//! [`InsiderClient`] owns a long-lived HTTP session and the bearer token. Every
//! read makes sure the token is still fresh first, and a read rejected with
//! 401/403 gets exactly one re-authentication and one retry:
//!
//! ```text
//! read ──▶ token valid? ──no──▶ authenticate
//!   │                                │
//!   ▼                                ▼
//!  GET ──401/403──▶ drop token ──▶ authenticate ──▶ GET ──401/403──▶ Authentication error
//!   │                                                 │
//!   ▼                                                 ▼
//! parse                                             parse
//! ```
//!
//! Response bodies are parsed by the rule tables in [`parse`].

pub mod auth;
pub mod error;
pub mod parse;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER, SET_COOKIE,
};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::fmt;
use std::time::Instant;
use url::Url;

use crate::config::{ApiConfig, Credentials};
use crate::metrics;
use crate::models::{HighScore, Machine, Team};

pub use auth::{AccessToken, DEFAULT_TOKEN_LIFETIME_SECS, TOKEN_EXPIRY_BUFFER_SECS};
pub use error::{ApiError, ApiResult};

/// Web origin the Insider API expects requests to come from
const INSIDER_ORIGIN: &str = "https://insider.sternpinball.com";

/// Upstream endpoints, also used as metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Login,
    Machines,
    HighScores,
    Teams,
}

impl Endpoint {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Machines => "machines",
            Self::HighScores => "high_scores",
            Self::Teams => "teams",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read operations the update coordinator depends on
#[async_trait]
pub trait InsiderApi: Send {
    /// Machines owned by the account, without scores
    async fn fetch_machines(&mut self) -> ApiResult<Vec<Machine>>;

    /// Top five scores of one machine, ordered by rank
    async fn fetch_high_scores(&mut self, machine_id: &str) -> ApiResult<Vec<HighScore>>;

    /// Teams the account belongs to
    async fn fetch_teams(&mut self) -> ApiResult<Vec<Team>>;
}

/// Authenticated client for the Insider API
pub struct InsiderClient {
    /// HTTP session shared by every request
    http: Client,

    /// Root of the API, e.g. `https://api.sternpinball.com`
    base_url: Url,

    credentials: Credentials,

    /// Current bearer token, if any
    token: Option<AccessToken>,

    /// Safety margin before expiry at which the token is refreshed
    expiry_buffer: Duration,
}

impl InsiderClient {
    /// Create a client from credentials and API settings
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Api` if the base URL is invalid or the HTTP client
    /// cannot be built
    pub fn new(credentials: Credentials, config: &ApiConfig) -> ApiResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ApiError::api(format!("Invalid base URL '{}': {e}", config.base_url)))?;

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout())
            .cookie_store(true)
            .gzip(true)
            .build()
            .map_err(|e| ApiError::api(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            credentials,
            token: None,
            expiry_buffer: Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS),
        })
    }

    /// Create a client pointed at a custom base URL, mostly for mock servers
    ///
    /// # Errors
    ///
    /// Same as [`InsiderClient::new`]
    pub fn with_base_url(
        username: impl Into<String>,
        password: impl Into<String>,
        base_url: &str,
    ) -> ApiResult<Self> {
        let config = ApiConfig {
            base_url: base_url.to_string(),
            ..ApiConfig::default()
        };
        Self::new(Credentials::new(username, password), &config)
    }

    /// Username the client logs in with
    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Current token, if one is held
    pub fn token(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }

    /// Check if the current token can still be used
    pub fn is_token_valid(&self) -> bool {
        self.token
            .as_ref()
            .is_some_and(|t| t.is_valid_at(Utc::now(), self.expiry_buffer))
    }

    /// Drop the current token so the next read logs in again
    pub fn invalidate_token(&mut self) {
        self.token = None;
    }

    /// Log in and store a fresh bearer token
    ///
    /// Any previously held token is dropped first, so a failed login leaves
    /// the client without a token.
    ///
    /// # Errors
    ///
    /// - `ApiError::Authentication` on 401/403, any other non-success status,
    ///   or a response without a token
    /// - `ApiError::Connection` if the login endpoint cannot be reached
    pub async fn authenticate(&mut self) -> ApiResult<()> {
        self.token = None;

        let url = self.endpoint_url(&["api", "login"], &[])?;
        let body = serde_json::json!({
            "username": self.credentials.username,
            "password": self.credentials.password,
        });

        let started = Instant::now();
        let response = self
            .http
            .post(url)
            .headers(Self::build_headers())
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::connection(format!("Failed to connect to Stern API: {e}")))?;

        let status = response.status();
        metrics::record_api_request(
            Endpoint::Login.as_str(),
            status.as_u16(),
            started.elapsed().as_secs_f64(),
        );

        match status {
            StatusCode::UNAUTHORIZED => {
                return Err(ApiError::authentication("Invalid username or password"));
            }
            StatusCode::FORBIDDEN => {
                return Err(ApiError::authentication("Account access denied"));
            }
            _ => {}
        }

        let set_cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::connection(format!("Failed to read login response: {e}")))?;
        let json: Option<Value> = serde_json::from_str(&text).ok();

        let grant = if status.is_success() {
            auth::extract_grant(json.as_ref(), &set_cookies)
        } else {
            None
        };

        tracing::debug!(
            status = %status,
            has_token = grant.is_some(),
            cookies = set_cookies.len(),
            "Auth response"
        );

        let Some(grant) = grant else {
            tracing::error!(status = %status, "Authentication failed, no token in response");
            return Err(ApiError::authentication(format!(
                "Authentication failed - status {}, has_token=false",
                status.as_u16()
            )));
        };

        let token = grant.into_token(Utc::now());
        tracing::info!(
            username = %self.credentials.username,
            expires_at = %token.expires_at(),
            "Successfully authenticated with Stern API"
        );
        self.token = Some(token);

        Ok(())
    }

    /// Check credentials for a setup or re-authentication flow
    ///
    /// Rejected credentials yield `Ok(false)`; only connection and protocol
    /// failures are returned as errors, so callers can tell "wrong password"
    /// apart from "cannot connect".
    pub async fn check_credentials(&mut self) -> ApiResult<bool> {
        match self.authenticate().await {
            Ok(()) => {
                tracing::info!("Credentials validated successfully");
                Ok(true)
            }
            Err(ApiError::Authentication(msg)) => {
                tracing::warn!(reason = %msg, "Credential validation failed");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Check credentials, treating every failure as "not valid"
    pub async fn validate_credentials(&mut self) -> bool {
        match self.check_credentials().await {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(error = %e, "Credential validation could not complete");
                false
            }
        }
    }

    /// Machines owned by the account, with empty score lists
    ///
    /// # Errors
    ///
    /// See [`InsiderClient::authenticate`]; `ApiError::Api` for unexpected
    /// status codes or bodies
    pub async fn fetch_machines(&mut self) -> ApiResult<Vec<Machine>> {
        let url = self.endpoint_url(&["api", "machines"], &[("group_type", "home")])?;
        let data = self.get_json(Endpoint::Machines, url).await?;

        let machines = parse::parse_machines(&data);
        tracing::debug!(count = machines.len(), "Fetched machines");
        Ok(machines)
    }

    /// Top five scores for `machine_id`, sorted by ascending rank
    ///
    /// # Errors
    ///
    /// Same as [`InsiderClient::fetch_machines`]
    pub async fn fetch_high_scores(&mut self, machine_id: &str) -> ApiResult<Vec<HighScore>> {
        let url = self.endpoint_url(
            &["api", "venuemachines", machine_id, "highscores"],
            &[("machine_id", machine_id)],
        )?;
        let data = self.get_json(Endpoint::HighScores, url).await?;

        let scores = parse::parse_high_scores(&data);
        tracing::debug!(machine_id = %machine_id, count = scores.len(), "Fetched high scores");
        Ok(scores)
    }

    /// Teams the account belongs to
    ///
    /// # Errors
    ///
    /// Same as [`InsiderClient::fetch_machines`]
    pub async fn fetch_teams(&mut self) -> ApiResult<Vec<Team>> {
        let url = self.endpoint_url(&["api", "teams"], &[])?;
        let data = self.get_json(Endpoint::Teams, url).await?;

        let teams = parse::parse_teams(&data);
        tracing::debug!(count = teams.len(), "Fetched teams");
        Ok(teams)
    }

    /// Authenticated GET with a single re-authentication on 401/403
    async fn get_json(&mut self, endpoint: Endpoint, url: Url) -> ApiResult<Value> {
        if !self.is_token_valid() {
            tracing::debug!(endpoint = %endpoint, "Token missing or stale, authenticating");
            self.authenticate().await?;
        }

        let mut response = self.send_get(endpoint, &url).await?;

        if Self::is_auth_rejection(response.status()) {
            tracing::info!(
                endpoint = %endpoint,
                status = %response.status(),
                "Token rejected, re-authenticating once"
            );
            metrics::record_reauthentication();

            self.token = None;
            self.authenticate().await?;

            response = self.send_get(endpoint, &url).await?;
            if Self::is_auth_rejection(response.status()) {
                return Err(ApiError::authentication("Authentication failed after retry"));
            }
        }

        Self::read_json(response).await
    }

    async fn send_get(&self, endpoint: Endpoint, url: &Url) -> ApiResult<Response> {
        let token = self.token.as_ref().map(AccessToken::value).unwrap_or_default();

        let started = Instant::now();
        let response = self
            .http
            .get(url.clone())
            .headers(Self::build_headers())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::connection(format!("API request failed: {e}")))?;

        metrics::record_api_request(
            endpoint.as_str(),
            response.status().as_u16(),
            started.elapsed().as_secs_f64(),
        );

        Ok(response)
    }

    async fn read_json(response: Response) -> ApiResult<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(ApiError::api(format!("Unexpected status {status}: {snippet}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::connection(format!("Failed to read response body: {e}")))?;

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ApiError::api(format!("Malformed JSON response: {e}")))?;

        if !(value.is_object() || value.is_array()) {
            return Err(ApiError::api("Unexpected response shape"));
        }

        Ok(value)
    }

    fn is_auth_rejection(status: StatusCode) -> bool {
        matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
    }

    /// Join path segments and query pairs onto the base URL
    fn endpoint_url(&self, segments: &[&str], query: &[(&str, &str)]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::api(format!("Base URL cannot hold a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        Ok(url)
    }

    /// Browser-like headers the Insider API expects
    fn build_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(ORIGIN, HeaderValue::from_static(INSIDER_ORIGIN));
        headers.insert(
            REFERER,
            HeaderValue::from_static("https://insider.sternpinball.com/"),
        );
        headers
    }
}

impl fmt::Debug for InsiderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsiderClient")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.credentials.username)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl InsiderApi for InsiderClient {
    async fn fetch_machines(&mut self) -> ApiResult<Vec<Machine>> {
        InsiderClient::fetch_machines(self).await
    }

    async fn fetch_high_scores(&mut self, machine_id: &str) -> ApiResult<Vec<HighScore>> {
        InsiderClient::fetch_high_scores(self, machine_id).await
    }

    async fn fetch_teams(&mut self) -> ApiResult<Vec<Team>> {
        InsiderClient::fetch_teams(self).await
    }
}
