//! Response capture
//! What a backend call observed, and how each outcome settles into a response

use std::collections::BTreeMap;

use crate::bridge::types::ProxyResponse;

/// Status, headers and body observed during a single backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Default for CapturedResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }
}

impl CapturedResponse {
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Names are lower-cased; a repeated name overwrites the earlier value
    pub fn record_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.record_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Whether the call got far enough to deliver headers or a body
    pub fn has_data(&self) -> bool {
        !self.body.is_empty() || !self.headers.is_empty()
    }

    pub fn into_response(self) -> ProxyResponse {
        ProxyResponse {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// Result of one backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success(CapturedResponse),
    /// The backend answered with an HTTP-level error
    StatusError {
        code: u16,
        message: String,
        captured: CapturedResponse,
    },
    /// The call broke down; `captured` holds whatever arrived before that
    TransportError {
        message: String,
        captured: CapturedResponse,
    },
}

/// Terminal state of a dispatched call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    CapturedViaObserver {
        response: ProxyResponse,
        /// Transport error dropped because data had already been captured
        discarded_error: Option<String>,
    },
    CapturedViaErrorCode(ProxyResponse),
    Failed(String),
}

impl CallOutcome {
    pub fn settle(self) -> Settled {
        match self {
            CallOutcome::Success(captured) => Settled::CapturedViaObserver {
                response: captured.into_response(),
                discarded_error: None,
            },
            CallOutcome::StatusError {
                code,
                message,
                mut captured,
            } => {
                captured.status = code;
                if captured.body.is_empty() {
                    captured.body = message;
                }
                Settled::CapturedViaErrorCode(captured.into_response())
            }
            CallOutcome::TransportError { message, captured } => {
                if captured.has_data() {
                    Settled::CapturedViaObserver {
                        response: captured.into_response(),
                        discarded_error: Some(message),
                    }
                } else {
                    Settled::Failed(message)
                }
            }
        }
    }
}
