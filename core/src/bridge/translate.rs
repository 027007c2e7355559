//! Request translator
//! Turns a ProxyRequest into a backend locator, headers and message body

use bytes::Bytes;
use url::form_urlencoded;

use crate::bridge::types::{FieldList, ProxyMethod, ProxyRequest};

pub const DEFAULT_CONTENT_TYPE: &str = "application/xml";

/// Payload handed to the backend for POST and PUT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody {
    pub content_type: String,
    pub payload: Bytes,
}

/// A fully translated backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: ProxyMethod,
    /// Path plus encoded query string
    pub locator: String,
    /// `None` when the client sent no headers at all
    pub headers: Option<FieldList>,
    /// Only set for methods that carry a body
    pub body: Option<MessageBody>,
}

/// Append form-encoded query parameters to a path
pub fn build_locator(path: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }

    let query = params
        .iter()
        .map(|(key, value)| format!("{}={}", encode(key), encode(value)))
        .collect::<Vec<_>>()
        .join("&");

    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{}{}{}", path, separator, query)
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// `Content-Type` wins over `content-type`; anything else falls back to XML
pub fn resolve_content_type(headers: &[(String, String)]) -> &str {
    let lookup = |name: &str| {
        headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    };

    lookup("Content-Type")
        .or_else(|| lookup("content-type"))
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

pub fn build_body(body: Option<&str>, content_type: &str) -> MessageBody {
    let payload = match body {
        Some(text) if !text.is_empty() => Bytes::copy_from_slice(text.as_bytes()),
        _ => Bytes::new(),
    };

    MessageBody {
        content_type: content_type.to_string(),
        payload,
    }
}

/// Header fields as given, or `None` for an empty map
pub fn build_headers(headers: &[(String, String)]) -> Option<FieldList> {
    if headers.is_empty() {
        None
    } else {
        Some(headers.to_vec())
    }
}

pub fn translate(method: ProxyMethod, request: &ProxyRequest) -> OutboundRequest {
    let body = method.carries_body().then(|| {
        let content_type = resolve_content_type(&request.headers);
        build_body(request.body.as_deref(), content_type)
    });

    OutboundRequest {
        method,
        locator: build_locator(&request.path, &request.params),
        headers: build_headers(&request.headers),
        body,
    }
}
