//! Bridge data model
//! Inbound proxy requests, outbound envelopes and the per-call enums

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::bridge::error::{BridgeError, RequestError};

/// Ordered name/value pairs, kept in the order the client sent them
pub type FieldList = Vec<(String, String)>;

/// HTTP methods the backend call surface understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl ProxyMethod {
    /// Parse a method name case-insensitively
    pub fn parse(method: &str) -> Result<Self, BridgeError> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            other => Err(BridgeError::UnsupportedMethod(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Get)
    }

    /// POST and PUT send a message body, GET and DELETE never do
    pub fn carries_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }
}

impl fmt::Display for ProxyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the backend session for a call is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStrategy {
    /// No implicit locking of backend objects
    Stateless,
    /// Destination-scoped session shared by LOCK, mutate and UNLOCK calls
    EnqueueAffine,
}

impl SessionStrategy {
    /// Preferred strategy for a method. Mutating methods may still end up
    /// stateless when no enqueue session can be obtained.
    pub fn preferred_for(method: ProxyMethod) -> Self {
        if method.is_read_only() {
            Self::Stateless
        } else {
            Self::EnqueueAffine
        }
    }
}

impl fmt::Display for SessionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stateless => f.write_str("stateless"),
            Self::EnqueueAffine => f.write_str("enqueue"),
        }
    }
}

/// The single active backend target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub id: String,
    pub project: String,
}

/// One request as received on /proxy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxyRequest {
    pub method: String,
    pub path: String,
    pub headers: FieldList,
    pub params: FieldList,
    pub body: Option<String>,
}

impl ProxyRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Parse the JSON document posted to /proxy
    pub fn from_slice(raw: &[u8]) -> Result<Self, RequestError> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| RequestError::Malformed(e.to_string()))?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &Value) -> Result<Self, RequestError> {
        let obj = value
            .as_object()
            .ok_or_else(|| RequestError::Malformed("Request body must be a JSON object".to_string()))?;

        let path = string_field(obj, "path")?.unwrap_or_default();
        if path.is_empty() {
            return Err(RequestError::MissingPath);
        }

        Ok(Self {
            method: string_field(obj, "method")?.unwrap_or_else(|| "GET".to_string()),
            path,
            headers: object_field(obj, "headers")?,
            params: object_field(obj, "params")?,
            body: string_field(obj, "body")?,
        })
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_field(
    obj: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<Option<String>, RequestError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar_to_string(value)
            .map(Some)
            .ok_or_else(|| RequestError::Malformed(format!("Field '{}' must be a string", field))),
    }
}

fn object_field(
    obj: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<FieldList, RequestError> {
    let entries = match obj.get(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(entries)) => entries,
        Some(_) => {
            return Err(RequestError::Malformed(format!(
                "Field '{}' must be a JSON object",
                field
            )))
        }
    };

    let mut fields = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        if value.is_null() {
            continue;
        }
        let value = scalar_to_string(value).ok_or_else(|| {
            RequestError::Malformed(format!("Value of '{}.{}' must be a string", field, key))
        })?;
        fields.push((key.clone(), value));
    }
    Ok(fields)
}

/// Uniform result of one proxied call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub status: u16,
    /// Header names are lower-cased
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// JSON envelope returned by /proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyEnvelope {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl ProxyEnvelope {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: 500,
            error: Some(message.into()),
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }
}

impl From<ProxyResponse> for ProxyEnvelope {
    fn from(response: ProxyResponse) -> Self {
        Self {
            status: response.status,
            error: None,
            headers: response.headers,
            body: response.body,
        }
    }
}

/// Body of GET /health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub plugin: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub project: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_parse_is_case_insensitive() {
        assert_eq!(ProxyMethod::parse("get").unwrap(), ProxyMethod::Get);
        assert_eq!(ProxyMethod::parse("Delete").unwrap(), ProxyMethod::Delete);

        let err = ProxyMethod::parse("patch").unwrap_err();
        assert_eq!(err.to_string(), "Unsupported method: PATCH");
    }

    #[test]
    fn test_preferred_strategy() {
        assert_eq!(SessionStrategy::preferred_for(ProxyMethod::Get), SessionStrategy::Stateless);
        for method in [ProxyMethod::Post, ProxyMethod::Put, ProxyMethod::Delete] {
            assert_eq!(SessionStrategy::preferred_for(method), SessionStrategy::EnqueueAffine);
        }
    }

    #[test]
    fn test_from_json_defaults_method_to_get() {
        let request = ProxyRequest::from_json(&json!({"path": "/sap/bc/adt/discovery"})).unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/sap/bc/adt/discovery");
        assert!(request.headers.is_empty());
        assert!(request.params.is_empty());
        assert_eq!(request.body, None);
    }

    #[test]
    fn test_from_json_keeps_field_order_and_stringifies_scalars() {
        let request = ProxyRequest::from_json(&json!({
            "method": "post",
            "path": "/sap/bc/adt/programs/programs",
            "headers": {"Content-Type": "text/plain", "Accept": "*/*"},
            "params": {"maxResults": 20, "query": "Z*", "exact": false},
            "body": "REPORT ztest."
        }))
        .unwrap();

        assert_eq!(request.method, "post");
        assert_eq!(
            request.headers,
            vec![
                ("Content-Type".to_string(), "text/plain".to_string()),
                ("Accept".to_string(), "*/*".to_string()),
            ]
        );
        assert_eq!(
            request.params,
            vec![
                ("maxResults".to_string(), "20".to_string()),
                ("query".to_string(), "Z*".to_string()),
                ("exact".to_string(), "false".to_string()),
            ]
        );
        assert_eq!(request.body.as_deref(), Some("REPORT ztest."));
    }

    #[test]
    fn test_from_json_missing_or_empty_path() {
        assert_eq!(
            ProxyRequest::from_json(&json!({"method": "GET"})).unwrap_err(),
            RequestError::MissingPath
        );
        assert_eq!(
            ProxyRequest::from_json(&json!({"path": ""})).unwrap_err(),
            RequestError::MissingPath
        );
    }

    #[test]
    fn test_from_json_rejects_non_object_headers() {
        let err = ProxyRequest::from_json(&json!({"path": "/x", "headers": ["a"]})).unwrap_err();
        assert!(matches!(err, RequestError::Malformed(_)));
    }

    #[test]
    fn test_from_slice_rejects_invalid_json() {
        let err = ProxyRequest::from_slice(b"{not json").unwrap_err();
        assert!(matches!(err, RequestError::Malformed(_)));
    }

    #[test]
    fn test_failure_envelope_shape() {
        let value = serde_json::to_value(ProxyEnvelope::failure("boom")).unwrap();
        assert_eq!(
            value,
            json!({"status": 500, "error": "boom", "headers": {}, "body": ""})
        );
    }
}
