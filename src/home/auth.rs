//! Home Assistant authentication
//!
//! Supports long-lived access tokens and the OAuth refresh-token flow
//! against `/auth/token`, caching the short-lived access token until it
//! expires.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::{Error, Result};

/// Refresh this long before the reported expiry
const EXPIRY_MARGIN_SECS: i64 = 10;

/// Response from `POST /auth/token`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token for API calls
    pub access_token: String,

    /// Lifetime of `access_token` in seconds
    pub expires_in: i64,

    /// Present for the authorization-code grant only
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Usually "Bearer"
    #[serde(default)]
    pub token_type: Option<String>,
}

/// How we authenticate against Home Assistant
pub enum Credentials {
    /// Long-lived access token used as-is
    LongLived(SecretString),
    /// Refresh token exchanged for short-lived access tokens
    Refresh(SecretString),
}

impl Credentials {
    /// Pick credentials from config, preferring a long-lived token
    #[must_use]
    pub fn from_config(access_token: Option<&str>, refresh_token: Option<&str>) -> Option<Self> {
        access_token
            .map(|t| Self::LongLived(SecretString::from(t.to_string())))
            .or_else(|| refresh_token.map(|t| Self::Refresh(SecretString::from(t.to_string()))))
    }
}

struct CachedToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

/// Supplies bearer tokens, refreshing them when they expire
pub struct TokenManager {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    /// Create a token manager for the instance at `base_url`
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str, credentials: Option<Credentials>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            cached: Mutex::new(None),
        }
    }

    /// Current bearer token
    ///
    /// # Errors
    ///
    /// Returns a config error when no credentials are configured, or
    /// `BackendUnavailable` if the refresh request fails
    pub async fn bearer(&self) -> Result<String> {
        let refresh_token = match &self.credentials {
            Some(Credentials::LongLived(token)) => return Ok(token.expose_secret().to_string()),
            Some(Credentials::Refresh(token)) => token,
            None => {
                return Err(Error::Config(
                    "no Home Assistant token configured (set HA_TOKEN or HA_REFRESH_TOKEN)"
                        .to_string(),
                ));
            }
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Utc::now() < token.expires_at {
                return Ok(token.token.expose_secret().to_string());
            }
            tracing::debug!("home assistant access token expired");
        }

        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.base_url.as_str()),
                ("refresh_token", refresh_token.expose_secret()),
            ])
            .await?;

        let expires_at =
            Utc::now() + Duration::seconds(response.expires_in.saturating_sub(EXPIRY_MARGIN_SECS));
        let bearer = response.access_token.clone();
        *cached = Some(CachedToken {
            token: SecretString::from(response.access_token),
            expires_at,
        });

        tracing::debug!(%expires_at, "refreshed home assistant access token");
        Ok(bearer)
    }

    /// Exchange an onboarding authorization code for tokens
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if the token endpoint rejects the code
    pub async fn exchange_auth_code(&self, code: &str) -> Result<TokenResponse> {
        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.base_url.as_str()),
                ("code", code),
            ])
            .await?;

        if response.refresh_token.is_none() {
            tracing::warn!("token endpoint returned no refresh token");
        }
        Ok(response)
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let url = format!("{}/auth/token", self.base_url);
        let response = self
            .client
            .post(&url)
            .form(form)
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "home assistant token endpoint error");
            return Err(Error::BackendUnavailable(format!(
                "token endpoint returned {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::MalformedResponse(format!("invalid token response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_lived_token_wins() {
        let creds = Credentials::from_config(Some("long"), Some("refresh")).unwrap();
        assert!(matches!(creds, Credentials::LongLived(_)));

        let creds = Credentials::from_config(None, Some("refresh")).unwrap();
        assert!(matches!(creds, Credentials::Refresh(_)));

        assert!(Credentials::from_config(None, None).is_none());
    }

    #[tokio::test]
    async fn long_lived_token_needs_no_network() {
        let manager = TokenManager::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            Credentials::from_config(Some("abc"), None),
        );
        assert_eq!(manager.bearer().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn missing_credentials_is_config_error() {
        let manager = TokenManager::new(reqwest::Client::new(), "http://127.0.0.1:9", None);
        assert!(matches!(manager.bearer().await, Err(Error::Config(_))));
    }
}
