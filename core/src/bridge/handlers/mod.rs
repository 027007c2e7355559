//! Request handlers for the bridge endpoints

pub mod health;
pub mod proxy;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

/// JSON body with `Content-Type: application/json`
pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, Json(body)).into_response()
}

/// Every endpoint is open to all origins
pub(crate) fn with_cors(mut response: Response, methods: &'static str, allow_headers: bool) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(methods));
    if allow_headers {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        );
    }
    response
}

/// Pre-flight answer: 204 without a body
pub(crate) fn preflight() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
