//! Instance credentials and OAuth token handling.
//!
//! Basic authentication needs nothing but the user credentials. When a
//! client id and secret are configured, requests carry a bearer token from
//! the instance's `oauth_token.do` endpoint instead: obtained with the
//! password grant, then renewed with the refresh grant once it expires.

use crate::error::{RemoteError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const URI_PATH_AUTH_TOKEN: &str = "oauth_token.do";

/// Tokens are renewed this long before they actually expire.
const EXPIRY_SKEW_SECS: i64 = 30;

/// User name and password. The password never appears in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    pub user_name: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_name", &self.user_name)
            .field("password", &"***")
            .finish()
    }
}

/// OAuth client registration.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    1800
}

/// Token endpoint error body.
#[derive(Debug, Deserialize)]
pub struct TokenError {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// A bearer token and when it stops being valid.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn from_response(response: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            expires_on: issued_at + Duration::seconds(response.expires_in),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) >= self.expires_on
    }
}

/// Caches one access token per client and renews it on demand.
pub struct TokenProvider {
    http: reqwest::Client,
    token_url: String,
    client: ClientCredentials,
    user: Credentials,
    token: Mutex<Option<AccessToken>>,
}

impl TokenProvider {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        client: ClientCredentials,
        user: Credentials,
    ) -> Self {
        Self {
            http,
            token_url: format!("{}/{}", base_url.trim_end_matches('/'), URI_PATH_AUTH_TOKEN),
            client,
            user,
            token: Mutex::new(None),
        }
    }

    /// A token valid right now, fetching or refreshing as needed.
    pub async fn get_valid_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if !token.is_expired_at(now) {
                return Ok(token.access_token.clone());
            }
        }

        let refresh_token = cached.as_ref().and_then(|t| t.refresh_token.clone());
        let token = match refresh_token {
            Some(refresh_token) => match self.refresh(&refresh_token).await {
                Ok(token) => token,
                Err(e) => {
                    warn!(error = %e, "Token refresh failed; requesting a new token");
                    self.password_grant().await?
                }
            },
            None => self.password_grant().await?,
        };

        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn password_grant(&self) -> Result<AccessToken> {
        info!(client_id = %self.client.client_id, user = %self.user.user_name, "Requesting access token");
        let form = [
            ("grant_type", "password"),
            ("client_id", self.client.client_id.as_str()),
            ("client_secret", self.client.client_secret.as_str()),
            ("username", self.user.user_name.as_str()),
            ("password", self.user.password.as_str()),
        ];
        self.request_token(&form).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AccessToken> {
        debug!(client_id = %self.client.client_id, "Refreshing access token");
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client.client_id.as_str()),
            ("client_secret", self.client.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.request_token(&form).await
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<AccessToken> {
        let issued_at = Utc::now();
        let response = self
            .http
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let detail = serde_json::from_str::<TokenError>(&body)
                .map(|e| match e.error_description {
                    Some(description) => format!("{}: {}", e.error, description),
                    None => e.error,
                })
                .unwrap_or(body);
            return Err(RemoteError::auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                detail
            )));
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|source| RemoteError::ResponseParsing {
                uri: self.token_url.clone(),
                source,
            })?;
        if parsed.access_token.is_empty() {
            return Err(RemoteError::auth("token endpoint returned an empty access token"));
        }
        Ok(AccessToken::from_response(parsed, issued_at))
    }
}
