//! Proxy HTTP surface tests.
//!
//! Drive the router directly with tower `oneshot` requests; the upstream
//! session-creation endpoint is a wiremock server. Response bodies are part
//! of the demo's contract, so they are asserted verbatim.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::util::ServiceExt;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voxcall::proxy::create_session_router;
use voxcall::{Config, CredentialBroker};

/// Proxy configuration pointed at a (possibly mocked) upstream.
fn proxy_config(secret: Option<&str>, sessions_url: &str) -> Config {
    Config {
        openai_api_key: secret.map(String::from),
        model: "gpt-4o-realtime-preview".to_string(),
        instructions: "You are a friendly, concise voice agent.".to_string(),
        sessions_url: Url::parse(sessions_url).unwrap(),
        realtime_url: Url::parse("wss://api.openai.com/v1/realtime").unwrap(),
        session_endpoint: None,
        host: "127.0.0.1".to_string(),
        port: 0,
        commit_interval_ms: 1400,
        capture_buffer: 4096,
        playback_sample_rate: 24000,
    }
}

fn router_for(config: &Config) -> axum::Router {
    create_session_router(Arc::new(CredentialBroker::new(config)))
}

async fn body_json_of(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = router_for(&proxy_config(None, "http://127.0.0.1:1/v1/realtime/sessions"));
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json_of(response).await, json!({ "status": "OK" }));
}

#[tokio::test]
async fn test_mint_session_success() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .and(header("Authorization", "Bearer sk-proxy-test"))
        .and(header("OpenAI-Beta", "realtime=v1"))
        .and(body_json(json!({
            "model": "gpt-4o-realtime-preview",
            "instructions": "You are a friendly, concise voice agent.",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "sess_1",
            "client_secret": { "value": "ek_test_123", "expires_at": 1754000000 }
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let config = proxy_config(
        Some("sk-proxy-test"),
        &format!("{}/v1/realtime/sessions", upstream.uri()),
    );
    let response = router_for(&config)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json_of(response).await,
        json!({ "ephemeral_key": "ek_test_123" })
    );
}

#[tokio::test]
async fn test_missing_secret_is_reported_without_an_upstream_call() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let config = proxy_config(None, &format!("{}/v1/realtime/sessions", upstream.uri()));
    let response = router_for(&config)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json_of(response).await,
        json!({ "error": "Missing OPENAI_API_KEY" })
    );
}

#[tokio::test]
async fn test_upstream_rejection_carries_details() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Incorrect API key provided" }
            })),
        )
        .mount(&upstream)
        .await;

    let config = proxy_config(
        Some("sk-bad"),
        &format!("{}/v1/realtime/sessions", upstream.uri()),
    );
    let response = router_for(&config)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json_of(response).await;
    assert_eq!(body["error"], "Failed to mint ephemeral key");
    let details = body["details"].as_str().unwrap();
    assert!(details.contains("401"), "details should carry the status: {details}");
    assert!(details.contains("Incorrect API key provided"));
}

#[tokio::test]
async fn test_credential_less_upstream_response_is_a_failure() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "sess_1" })))
        .mount(&upstream)
        .await;

    let config = proxy_config(
        Some("sk-test"),
        &format!("{}/v1/realtime/sessions", upstream.uri()),
    );
    let response = router_for(&config)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json_of(response).await;
    assert_eq!(body["error"], "Failed to mint ephemeral key");
    assert!(
        body["details"]
            .as_str()
            .unwrap()
            .contains("client_secret.value")
    );
}

#[tokio::test]
async fn test_wrong_method_gets_json_405() {
    let app = router_for(&proxy_config(None, "http://127.0.0.1:1/v1/realtime/sessions"));
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        body_json_of(response).await,
        json!({ "error": "Method not allowed" })
    );
}

#[tokio::test]
async fn test_cors_preflight_allows_any_origin() {
    let app = router_for(&proxy_config(None, "http://127.0.0.1:1/v1/realtime/sessions"));
    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/session")
                .header("Origin", "https://demo.example")
                .header("Access-Control-Request-Method", "POST")
                .header("Access-Control-Request-Headers", "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    let methods = headers["access-control-allow-methods"].to_str().unwrap();
    assert!(methods.contains("POST"));
    assert!(methods.contains("OPTIONS"));
    let allowed = headers["access-control-allow-headers"].to_str().unwrap();
    assert!(allowed.to_ascii_lowercase().contains("content-type"));
}

#[tokio::test]
async fn test_simple_cors_response_on_mint() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "client_secret": { "value": "ek_cors" }
        })))
        .mount(&upstream)
        .await;

    let config = proxy_config(
        Some("sk-test"),
        &format!("{}/v1/realtime/sessions", upstream.uri()),
    );
    let response = router_for(&config)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/session")
                .header("Origin", "https://demo.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}
