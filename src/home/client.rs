//! Home Assistant REST client

use async_trait::async_trait;

use super::auth::{Credentials, TokenManager, TokenResponse};
use super::entity::{Action, DeviceEntity, domain_of};
use super::DeviceRegistry;
use crate::config::HomeConfig;
use crate::lifecycle::{BackendSupervisor, HttpProbe, LaunchCommand, LivenessProbe, Readiness};
use crate::{Error, Result};

/// Entity snapshot endpoint
const ENTITY_ENDPOINT: &str = "/api/states";

/// Unauthenticated endpoint used for liveness checks
const LIVENESS_ENDPOINT: &str = "/manifest.json";

/// Client for a single Home Assistant instance
pub struct HomeClient {
    client: reqwest::Client,
    base_url: String,
    tokens: TokenManager,
    probe: HttpProbe,
    supervisor: BackendSupervisor,
}

impl HomeClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is invalid
    pub fn new(config: &HomeConfig) -> Result<Self> {
        let credentials = Credentials::from_config(
            config.access_token.as_deref(),
            config.refresh_token.as_deref(),
        );
        let supervisor = BackendSupervisor::new(
            "home-assistant",
            LaunchCommand::from_argv(&config.launch_command),
        )
        .with_polling(crate::lifecycle::POLL_INTERVAL, config.startup_timeout);

        Self::with_parts(&config.base_url, credentials, supervisor)
    }

    /// Create a client against `base_url` with explicit credentials and no
    /// launch command
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is invalid
    pub fn with_base_url(base_url: &str, credentials: Option<Credentials>) -> Result<Self> {
        Self::with_parts(base_url, credentials, BackendSupervisor::new("home-assistant", None))
    }

    fn with_parts(
        base_url: &str,
        credentials: Option<Credentials>,
        supervisor: BackendSupervisor,
    ) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid Home Assistant URL {base_url}: {e}")))?;
        let base_url = parsed.as_str().trim_end_matches('/').to_string();

        let client = reqwest::Client::new();
        let tokens = TokenManager::new(client.clone(), &base_url, credentials);
        let probe = HttpProbe::new(client.clone(), format!("{base_url}{LIVENESS_ENDPOINT}"));

        tracing::debug!(url = %base_url, "home assistant client initialized");

        Ok(Self {
            client,
            base_url,
            tokens,
            probe,
            supervisor,
        })
    }

    /// Base URL of the instance
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replace the startup supervisor (polling policy, launch command)
    #[must_use]
    pub fn with_supervisor(mut self, supervisor: BackendSupervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    /// Lightweight probe; connection failures and timeouts read as "not live"
    pub async fn is_backend_live(&self) -> bool {
        self.probe.is_live().await
    }

    /// Launch Home Assistant if it is down and wait for it to answer
    ///
    /// # Errors
    ///
    /// Returns `StartupTimeout` if it never becomes live
    pub async fn ensure_running(&self) -> Result<Readiness> {
        self.supervisor.ensure_running(&self.probe).await
    }

    /// Exchange an onboarding authorization code for tokens
    ///
    /// # Errors
    ///
    /// Returns error if the token endpoint rejects the code
    pub async fn exchange_auth_code(&self, code: &str) -> Result<TokenResponse> {
        self.tokens.exchange_auth_code(code).await
    }

    /// Fetch the current entity snapshot
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` on connection failure or error status,
    /// `MalformedResponse` if records cannot be parsed
    pub async fn fetch_entities(&self) -> Result<Vec<DeviceEntity>> {
        let bearer = self.tokens.bearer().await?;
        let url = format!("{}{ENTITY_ENDPOINT}", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "home assistant request failed");
                Error::BackendUnavailable(format!("GET {ENTITY_ENDPOINT}: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "home assistant states error");
            return Err(Error::BackendUnavailable(format!(
                "GET {ENTITY_ENDPOINT} returned {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("reading states body: {e}")))?;
        let entities: Vec<DeviceEntity> = serde_json::from_slice(&body)
            .map_err(|e| Error::MalformedResponse(format!("invalid entity records: {e}")))?;

        tracing::debug!(count = entities.len(), "fetched entity snapshot");
        Ok(entities)
    }

    /// Call the service for `action` on `entity_id`
    ///
    /// Returns whether Home Assistant answered with a success status.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAction` before any I/O if `action` is unknown,
    /// `BackendUnavailable` if the request cannot be sent
    pub async fn invoke_action(&self, entity_id: &str, action: &str) -> Result<bool> {
        let action: Action = action.parse()?;
        self.perform(entity_id, action).await
    }

    async fn perform(&self, entity_id: &str, action: Action) -> Result<bool> {
        let domain = domain_of(entity_id);
        let url = format!(
            "{}/api/services/{domain}/{}",
            self.base_url,
            action.service()
        );
        let bearer = self.tokens.bearer().await?;

        tracing::info!(entity_id, %action, "invoking home assistant service");

        let response = self
            .client
            .post(&url)
            .bearer_auth(bearer)
            .json(&serde_json::json!({ "entity_id": entity_id }))
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("POST service {action}: {e}")))?;

        let success = response.status().is_success();
        if !success {
            tracing::warn!(entity_id, %action, status = %response.status(), "service call rejected");
        }
        Ok(success)
    }
}

#[async_trait]
impl DeviceRegistry for HomeClient {
    async fn fetch_entities(&self) -> Result<Vec<DeviceEntity>> {
        Self::fetch_entities(self).await
    }

    async fn invoke_action(&self, entity_id: &str, action: &str) -> Result<bool> {
        Self::invoke_action(self, entity_id, action).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_url() {
        assert!(matches!(
            HomeClient::with_base_url("not a url", None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn strips_trailing_slash() {
        let client = HomeClient::with_base_url("http://ha.local:8123/", None).unwrap();
        assert_eq!(client.base_url(), "http://ha.local:8123");
    }

    #[tokio::test]
    async fn unsupported_action_fails_before_io() {
        // Port 9 (discard) is never contacted
        let client = HomeClient::with_base_url(
            "http://127.0.0.1:9",
            Credentials::from_config(Some("token"), None),
        )
        .unwrap();

        let err = client.invoke_action("light.kitchen", "dim").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedAction(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_is_not_live() {
        let client = HomeClient::with_base_url("http://127.0.0.1:9", None).unwrap();
        assert!(!client.is_backend_live().await);
    }
}
