//! Proxy handler
//! Handles POST /proxy: parse the JSON request, run it, wrap the result

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::Response,
};
use serde_json::json;
use tracing::Instrument;

use crate::bridge::error::RequestError;
use crate::bridge::handlers::{json_response, preflight, with_cors};
use crate::bridge::server::AppState;
use crate::bridge::types::{ProxyEnvelope, ProxyRequest};

const ALLOWED_METHODS: &str = "POST, OPTIONS";

/// Handle /proxy
pub async fn handle_proxy(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    let response = match method {
        Method::OPTIONS => preflight(),
        Method::POST => proxy(state, &body).await,
        _ => json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({"error": "Method not allowed. Use POST."}),
        ),
    };

    with_cors(response, ALLOWED_METHODS, true)
}

async fn proxy(state: AppState, raw: &[u8]) -> Response {
    let request = match ProxyRequest::from_slice(raw) {
        Ok(request) => request,
        Err(RequestError::MissingPath) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                json!({"error": RequestError::MissingPath.to_string()}),
            );
        }
        Err(e) => {
            tracing::error!("Proxy request rejected: {}", e);
            return json_response(StatusCode::OK, ProxyEnvelope::failure(e.to_string()));
        }
    };

    let request_id = uuid::Uuid::new_v4().simple().to_string();
    let span = tracing::info_span!(
        "proxy",
        request_id = %request_id,
        method = %request.method,
        path = %request.path
    );

    let result = state
        .executor
        .execute_request(&request)
        .instrument(span)
        .await;

    // Bridge failures still travel inside a 200 envelope
    let envelope = match result {
        Ok(response) => ProxyEnvelope::from(response),
        Err(e) => {
            tracing::error!(
                "Proxy request {} {} failed: {}",
                request.method,
                request.path,
                e
            );
            ProxyEnvelope::failure(e.to_string())
        }
    };

    json_response(StatusCode::OK, envelope)
}
