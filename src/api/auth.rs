//! Bearer token handling
//!
//! The login endpoint answers with a JSON body carrying the token and its
//! lifetime. Older deployments only set the token as a cookie, so the
//! `Set-Cookie` headers are checked when the body has nothing usable.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;

use super::parse::{first_string, first_u64, KeyPath};

/// Seconds before expiry at which a token is treated as stale
pub const TOKEN_EXPIRY_BUFFER_SECS: i64 = 300;

/// Lifetime assumed when the login response does not state one
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 1800;

/// Cookie that carries the token on cookie-based logins
pub const TOKEN_COOKIE: &str = "spb-insider-token";

static TOKEN_COOKIE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"spb-insider-token=([^;]+)").unwrap());

const TOKEN_RULES: &[KeyPath] = &[&["accessToken"], &["access_token"], &["token"]];
const EXPIRES_IN_RULES: &[KeyPath] = &[&["expiresIn"], &["expires_in"]];

/// A bearer token with its absolute expiry
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Create a token issued at `issued_at` that lives for `lifetime`
    pub fn new(value: impl Into<String>, issued_at: DateTime<Utc>, lifetime: Duration) -> Self {
        Self {
            value: value.into(),
            expires_at: issued_at + lifetime,
        }
    }

    /// Raw token value for the `Authorization` header
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When the upstream service stops accepting the token
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Valid iff `now` is still before the expiry minus `buffer`
    pub fn is_valid_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        now < self.expires_at - buffer
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// What a successful login handed back
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoginGrant {
    pub token: String,
    pub expires_in: Option<i64>,
}

impl LoginGrant {
    /// Turn the grant into a token, falling back to the default lifetime
    pub fn into_token(self, issued_at: DateTime<Utc>) -> AccessToken {
        let secs = self
            .expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        AccessToken::new(self.token, issued_at, Duration::seconds(secs))
    }
}

/// Pull a token out of the login response body or its cookies
pub(crate) fn extract_grant(body: Option<&Value>, set_cookies: &[String]) -> Option<LoginGrant> {
    let from_body = body.and_then(|b| first_string(b, TOKEN_RULES));
    let token = from_body.or_else(|| set_cookies.iter().find_map(|c| cookie_token(c)))?;

    let expires_in = body
        .and_then(|b| first_u64(b, EXPIRES_IN_RULES))
        .and_then(|secs| i64::try_from(secs).ok());

    Some(LoginGrant { token, expires_in })
}

fn cookie_token(header: &str) -> Option<String> {
    TOKEN_COOKIE_REGEX
        .captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|t| !t.is_empty())
}
