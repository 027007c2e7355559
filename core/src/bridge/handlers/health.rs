//! Health handler
//! Reports the bridge as up, plus which backend project it would use

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::Response,
};
use serde_json::json;

use crate::bridge::handlers::{json_response, preflight, with_cors};
use crate::bridge::server::AppState;
use crate::bridge::types::HealthReport;

pub const PLUGIN_NAME: &str = "adt-bridge";
const ALLOWED_METHODS: &str = "GET, OPTIONS";

/// Handle /health
pub async fn handle_health(State(state): State<AppState>, method: Method) -> Response {
    let response = match method {
        Method::OPTIONS => preflight(),
        Method::GET => {
            let report = HealthReport {
                status: "ok".to_string(),
                plugin: PLUGIN_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                project: state.executor.project_status().await,
            };
            json_response(StatusCode::OK, report)
        }
        _ => json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({"error": "Method not allowed"}),
        ),
    };

    with_cors(response, ALLOWED_METHODS, false)
}
