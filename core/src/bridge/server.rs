//! Bridge Server - Axum HTTP server
//! Serves /health and /proxy on the local bridge port

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing::any, Router};
use tower_http::trace::TraceLayer;

use crate::bridge::executor::ProxyExecutor;
use crate::bridge::handlers;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<ProxyExecutor>,
}

/// Bridge server instance
pub struct BridgeServer {
    host: String,
    port: u16,
    state: AppState,
}

impl BridgeServer {
    pub fn new(host: String, port: u16, executor: Arc<ProxyExecutor>) -> Self {
        Self {
            host,
            port,
            state: AppState { executor },
        }
    }

    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/health", any(handlers::health::handle_health))
            .route("/proxy", any(handlers::proxy::handle_proxy))
            .layer(DefaultBodyLimit::max(64 * 1024 * 1024))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Run the bridge server until a shutdown signal arrives
    pub async fn run(self) -> anyhow::Result<()> {
        let app = Self::router(self.state);

        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!("Bridge server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Bridge server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::capture::{CallOutcome, CapturedResponse};
    use crate::bridge::executor::testing::{DiscoveryScript, ScriptedBackend, StubDiscovery};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(discovery: Arc<StubDiscovery>, backend: Arc<ScriptedBackend>) -> Router {
        let executor = Arc::new(ProxyExecutor::new(discovery, backend));
        BridgeServer::router(AppState { executor })
    }

    fn post_proxy(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/proxy")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("should build request")
    }

    async fn response_json(response: Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("should collect body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("should be json")
    }

    #[tokio::test]
    async fn test_health_without_project_is_still_ok() {
        let router = app(StubDiscovery::new(DiscoveryScript::Empty), ScriptedBackend::ok(""));
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = router.oneshot(request).await.expect("should get response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, OPTIONS");

        let body = response_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["plugin"], "adt-bridge");
        assert_eq!(body["project"], "no_adt_project");
    }

    #[tokio::test]
    async fn test_health_reports_connected_destination() {
        let router = app(StubDiscovery::new(DiscoveryScript::Found("DEV_100")), ScriptedBackend::ok(""));
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let body = response_json(router.oneshot(request).await.unwrap()).await;
        assert_eq!(body["project"], "connected:DEV_100");
    }

    #[tokio::test]
    async fn test_health_rejects_post() {
        let router = app(StubDiscovery::new(DiscoveryScript::Empty), ScriptedBackend::ok(""));
        let request = Request::builder()
            .method("POST")
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response_json(response).await, json!({"error": "Method not allowed"}));
    }

    #[tokio::test]
    async fn test_proxy_preflight() {
        let router = app(StubDiscovery::new(DiscoveryScript::Empty), ScriptedBackend::ok(""));
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/proxy")
            .body(Body::empty())
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_proxy_rejects_get() {
        let router = app(StubDiscovery::new(DiscoveryScript::Empty), ScriptedBackend::ok(""));
        let request = Request::builder().uri("/proxy").body(Body::empty()).unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response_json(response).await,
            json!({"error": "Method not allowed. Use POST."})
        );
    }

    #[tokio::test]
    async fn test_missing_path_never_reaches_discovery() {
        let discovery = StubDiscovery::new(DiscoveryScript::Found("DEV"));
        let router = app(discovery.clone(), ScriptedBackend::ok(""));

        let response = router
            .oneshot(post_proxy(r#"{"method":"GET","headers":{"Accept":"*/*"}}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response_json(response).await,
            json!({"error": "Missing required field: path"})
        );
        assert_eq!(discovery.calls(), 0);
    }

    #[tokio::test]
    async fn test_proxy_success_envelope() {
        let backend = ScriptedBackend::new(
            true,
            CallOutcome::Success(
                CapturedResponse::with_status(200)
                    .with_header("Content-Type", "text/plain")
                    .with_body("REPORT ztest."),
            ),
        );
        let router = app(StubDiscovery::new(DiscoveryScript::Found("DEV")), backend);

        let response = router
            .oneshot(post_proxy(
                r#"{"method":"get","path":"/sap/bc/adt/programs/programs/ztest/source/main","headers":{"Accept":"text/plain"}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response_json(response).await,
            json!({
                "status": 200,
                "headers": {"content-type": "text/plain"},
                "body": "REPORT ztest."
            })
        );
    }

    #[tokio::test]
    async fn test_backend_status_is_embedded_in_200() {
        let backend = ScriptedBackend::new(
            true,
            CallOutcome::StatusError {
                code: 404,
                message: "not found".to_string(),
                captured: CapturedResponse::default(),
            },
        );
        let router = app(StubDiscovery::new(DiscoveryScript::Found("DEV")), backend);

        let response = router
            .oneshot(post_proxy(r#"{"path":"/sap/bc/adt/oo/classes/zcl_missing"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["status"], 404);
        assert_eq!(body["body"], "not found");
    }

    #[tokio::test]
    async fn test_transport_failure_envelope() {
        let backend = ScriptedBackend::new(
            true,
            CallOutcome::TransportError {
                message: "connection refused".to_string(),
                captured: CapturedResponse::default(),
            },
        );
        let router = app(StubDiscovery::new(DiscoveryScript::Found("DEV")), backend);

        let response = router
            .oneshot(post_proxy(r#"{"path":"/sap/bc/adt/discovery"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response_json(response).await,
            json!({"status": 500, "error": "connection refused", "headers": {}, "body": ""})
        );
    }

    #[tokio::test]
    async fn test_no_project_envelope() {
        let router = app(StubDiscovery::new(DiscoveryScript::Empty), ScriptedBackend::ok(""));

        let response = router
            .oneshot(post_proxy(r#"{"path":"/sap/bc/adt/discovery"}"#))
            .await
            .unwrap();

        let body = response_json(response).await;
        assert_eq!(body["status"], 500);
        assert!(body["error"].as_str().unwrap().starts_with("No ADT project found"));
        assert_eq!(body["headers"], json!({}));
        assert_eq!(body["body"], "");
    }

    #[tokio::test]
    async fn test_invalid_json_envelope() {
        let discovery = StubDiscovery::new(DiscoveryScript::Found("DEV"));
        let router = app(discovery.clone(), ScriptedBackend::ok(""));

        let response = router.oneshot(post_proxy("not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_json(response).await;
        assert_eq!(body["status"], 500);
        assert!(body["error"].as_str().unwrap().starts_with("Malformed proxy request"));
        assert_eq!(discovery.calls(), 0);
    }
}
