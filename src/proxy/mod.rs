//! Credential-minting proxy.
//!
//! The browser-facing half of the demo: an axum server exposing one session
//! endpoint that trades the server-held secret for a short-lived credential,
//! so the secret never reaches a client. Permissive CORS because the demo
//! page may be served from anywhere.

pub mod handler;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use http::Method;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::broker::CredentialBroker;
use crate::config::Config;
use crate::error::{VoiceError, VoiceResult};

/// Create the proxy router.
///
/// # Endpoints
///
/// - `POST /api/session` - mint a short-lived credential
/// - `GET /` - health probe
///
/// Any other method on the session route gets a JSON 405. OPTIONS preflight
/// is answered by the CORS layer.
pub fn create_session_router(broker: Arc<CredentialBroker>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    Router::new()
        .route(
            "/api/session",
            post(handler::mint_session).fallback(handler::method_not_allowed),
        )
        .route("/", get(handler::health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(broker)
}

/// Bind the configured address and serve until ctrl-c.
pub async fn serve(config: &Config) -> VoiceResult<()> {
    let broker = Arc::new(CredentialBroker::new(config));
    let app = create_session_router(broker);

    let address = config.address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| VoiceError::Config(format!("failed to bind {address}: {e}")))?;

    info!("credential proxy listening on http://{address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .map_err(|e| VoiceError::Transport(format!("server error: {e}")))
}
