//! Proxy request handlers.
//!
//! The response bodies are part of the demo's contract: clients parse
//! `ephemeral_key` on success and `error`/`details` on failure.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{error, info};

use crate::broker::CredentialBroker;
use crate::error::VoiceError;

/// `POST /api/session` - mint a short-lived credential.
///
/// No request body. A missing secret is the operator's configuration
/// problem and gets its own body; upstream failures are reported with the
/// broker's detail string so the operator can see the status and raw body.
pub async fn mint_session(State(broker): State<Arc<CredentialBroker>>) -> impl IntoResponse {
    match broker.request_credential().await {
        Ok(key) => {
            info!("minted session credential");
            (StatusCode::OK, Json(json!({ "ephemeral_key": key })))
        }
        Err(VoiceError::Config(reason)) => {
            error!(%reason, "credential proxy misconfigured");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Missing OPENAI_API_KEY" })),
            )
        }
        Err(e) => {
            error!(error = %e, "failed to mint credential");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to mint ephemeral key",
                    "details": e.to_string(),
                })),
            )
        }
    }
}

/// JSON 405 for non-POST methods on the session route.
pub async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
}

/// `GET /` - health probe.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "OK" }))
}
