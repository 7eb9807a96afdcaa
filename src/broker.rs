//! Credential broker: exchanges the long-lived secret for a short-lived
//! session credential.
//!
//! Two mint paths cover both halves of the demo. The proxy and a directly
//! configured client POST to the session-creation endpoint with the bearer
//! secret and extract `client_secret.value`; a client pointed at a running
//! proxy instead POSTs to the proxy endpoint and extracts `ephemeral_key`.
//! Either way the credential is used once, for exactly one connection
//! attempt, and never persisted.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::error::{VoiceError, VoiceResult};

/// Connect timeout for the pooled HTTP client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Session-creation response: `{ "client_secret": { "value": ... } }`.
#[derive(Debug, Deserialize)]
struct SessionResponse {
    client_secret: Option<ClientSecret>,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: Option<String>,
}

/// Proxy response: `{ "ephemeral_key": ... }`.
#[derive(Debug, Deserialize)]
struct ProxyResponse {
    ephemeral_key: Option<String>,
}

/// Mints session credentials.
///
/// Holds one pooled `reqwest` client for its whole life; every mint is a
/// single outbound call with no retry and no retained state.
pub struct CredentialBroker {
    client: reqwest::Client,
    secret: Option<String>,
    model: String,
    instructions: String,
    sessions_url: Url,
    session_endpoint: Option<Url>,
}

impl CredentialBroker {
    /// Build a broker from the loaded configuration.
    pub fn new(config: &Config) -> Self {
        // Client construction only fails on TLS backend misconfiguration;
        // fall back to the default client rather than propagate.
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            secret: config.openai_api_key.clone(),
            model: config.model.clone(),
            instructions: config.instructions.clone(),
            sessions_url: config.sessions_url.clone(),
            session_endpoint: config.session_endpoint.clone(),
        }
    }

    /// Mint one short-lived session credential.
    ///
    /// Every failure is terminal for this call: missing secret is `Config`,
    /// a failed request is `Transport`, and a non-2xx status or a response
    /// without the credential field is `Protocol` carrying the status and
    /// raw body for the caller to log.
    pub async fn request_credential(&self) -> VoiceResult<String> {
        match &self.session_endpoint {
            Some(endpoint) => self.mint_via_proxy(endpoint).await,
            None => self.mint_direct().await,
        }
    }

    /// POST the session-creation endpoint with the bearer secret.
    async fn mint_direct(&self) -> VoiceResult<String> {
        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| VoiceError::Config("OPENAI_API_KEY is not set".to_string()))?;

        debug!(url = %self.sessions_url, model = %self.model, "minting session credential");

        let response = self
            .client
            .post(self.sessions_url.clone())
            .header("Authorization", format!("Bearer {secret}"))
            .header("Content-Type", "application/json")
            .header("OpenAI-Beta", "realtime=v1")
            .json(&json!({
                "model": self.model,
                "instructions": self.instructions,
            }))
            .send()
            .await
            .map_err(|e| VoiceError::Transport(format!("credential request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VoiceError::Transport(format!("credential response unreadable: {e}")))?;

        if !status.is_success() {
            warn!(%status, "session-creation endpoint rejected the request");
            return Err(VoiceError::Protocol(format!(
                "session-creation endpoint returned {status}: {body}"
            )));
        }

        let parsed: SessionResponse = serde_json::from_str(&body).map_err(|e| {
            VoiceError::Protocol(format!("malformed session response ({e}): {body}"))
        })?;

        parsed
            .client_secret
            .and_then(|cs| cs.value)
            .ok_or_else(|| {
                VoiceError::Protocol(format!(
                    "session response missing client_secret.value: {body}"
                ))
            })
    }

    /// POST a running proxy's session endpoint; no body, no secret.
    async fn mint_via_proxy(&self, endpoint: &Url) -> VoiceResult<String> {
        debug!(url = %endpoint, "minting session credential via proxy");

        let response = self
            .client
            .post(endpoint.clone())
            .send()
            .await
            .map_err(|e| VoiceError::Transport(format!("proxy request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VoiceError::Transport(format!("proxy response unreadable: {e}")))?;

        if !status.is_success() {
            return Err(VoiceError::Protocol(format!(
                "proxy returned {status}: {body}"
            )));
        }

        let parsed: ProxyResponse = serde_json::from_str(&body)
            .map_err(|e| VoiceError::Protocol(format!("malformed proxy response ({e}): {body}")))?;

        parsed.ephemeral_key.ok_or_else(|| {
            VoiceError::Protocol(format!("proxy response missing ephemeral_key: {body}"))
        })
    }
}
