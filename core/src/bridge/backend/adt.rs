//! ADT backend over HTTP
//! Issues ADT REST calls against the configured ABAP systems with reqwest

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;

use crate::bridge::backend::{AffineSessions, BackendSession, SessionFactory, SessionUnavailable};
use crate::bridge::capture::{CallOutcome, CapturedResponse};
use crate::bridge::error::BridgeError;
use crate::bridge::translate::{MessageBody, OutboundRequest};
use crate::bridge::types::{Destination, FieldList, ProxyMethod, SessionStrategy};
use crate::config::{Config, DestinationConfig, TimeoutsConfig};

const SESSION_TYPE_HEADER: &str = "x-sap-adt-sessiontype";
const CSRF_HEADER: &str = "x-csrf-token";
const CSRF_FETCH_PATH: &str = "/sap/bc/adt/discovery";

static EXCEPTION_MESSAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<message[^>]*>(.*?)</message>").expect("static regex"));

/// One HTTP session against an ABAP system. Each session owns its cookie
/// jar and CSRF token, so an enqueue session keeps the backend's lock
/// context between calls.
pub struct AdtSession {
    destination_id: String,
    strategy: SessionStrategy,
    base_url: String,
    client: Client,
    sap_client: Option<String>,
    language: Option<String>,
    credentials: Option<(String, Option<String>)>,
    csrf_token: Mutex<Option<String>>,
    /// Set once the backend rejected the session's CSRF token
    expired: AtomicBool,
}

impl AdtSession {
    pub fn new(
        destination_id: &str,
        config: &DestinationConfig,
        strategy: SessionStrategy,
        timeouts: &TimeoutsConfig,
    ) -> reqwest::Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(timeouts.connect_timeout))
            .timeout(Duration::from_secs(timeouts.request_timeout))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(concat!("adt-bridge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            destination_id: destination_id.to_string(),
            strategy,
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
            sap_client: config.client.clone(),
            language: config.language.clone(),
            credentials: config
                .user
                .clone()
                .map(|user| (user, config.password.clone())),
            csrf_token: Mutex::new(None),
            expired: AtomicBool::new(false),
        })
    }

    fn url(&self, locator: &str) -> String {
        if locator.starts_with('/') {
            format!("{}{}", self.base_url, locator)
        } else {
            format!("{}/{}", self.base_url, locator)
        }
    }

    fn session_type(&self) -> &'static str {
        match self.strategy {
            SessionStrategy::Stateless => "stateless",
            SessionStrategy::EnqueueAffine => "stateful",
        }
    }

    fn request(&self, method: Method, locator: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, self.url(locator))
            .header(SESSION_TYPE_HEADER, self.session_type());

        if let Some(client) = &self.sap_client {
            builder = builder.header("sap-client", client);
        }
        if let Some(language) = &self.language {
            builder = builder.header("sap-language", language);
        }
        if let Some((user, password)) = &self.credentials {
            builder = builder.basic_auth(user, password.as_ref());
        }
        builder
    }

    /// Ask the backend for a CSRF token and remember it for mutating calls
    pub async fn fetch_csrf_token(&self) -> Result<(), String> {
        let response = self
            .request(Method::GET, CSRF_FETCH_PATH)
            .header(CSRF_HEADER, "fetch")
            .header(header::ACCEPT, "application/atomsvc+xml")
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("{} returned {}", CSRF_FETCH_PATH, status));
        }

        if let Some(token) = response
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(usable_csrf_token)
        {
            *self.csrf_token.lock().await = Some(token);
        }
        Ok(())
    }

    async fn remember_csrf_token(&self, captured: &CapturedResponse) {
        if let Some(token) = captured
            .headers
            .get(CSRF_HEADER)
            .and_then(|v| usable_csrf_token(v))
        {
            *self.csrf_token.lock().await = Some(token);
        }
    }

    /// Backend context is gone; the token and the session must not be reused
    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    async fn expire(&self) {
        *self.csrf_token.lock().await = None;
        self.expired.store(true, Ordering::SeqCst);
    }

    fn header_map(
        fields: Option<&FieldList>,
        body: Option<&MessageBody>,
        csrf_token: Option<&str>,
    ) -> Result<HeaderMap, String> {
        let mut headers = HeaderMap::new();

        for (name, value) in fields.into_iter().flatten() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| format!("Invalid header name {:?}: {}", name, e))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| format!("Invalid value for header {}: {}", name, e))?;
            headers.append(name, value);
        }

        if let Some(body) = body {
            let content_type = HeaderValue::from_str(&body.content_type)
                .map_err(|e| format!("Invalid content type {:?}: {}", body.content_type, e))?;
            headers.insert(header::CONTENT_TYPE, content_type);
        }

        if let Some(token) = csrf_token {
            if !headers.contains_key(CSRF_HEADER) {
                let token = HeaderValue::from_str(token).map_err(|e| e.to_string())?;
                headers.insert(CSRF_HEADER, token);
            }
        }

        Ok(headers)
    }
}

#[async_trait]
impl BackendSession for AdtSession {
    fn strategy(&self) -> SessionStrategy {
        self.strategy
    }

    async fn call(&self, request: OutboundRequest) -> CallOutcome {
        let OutboundRequest {
            method,
            locator,
            headers,
            body,
        } = request;

        let mutating = !method.is_read_only();
        if mutating && self.csrf_token.lock().await.is_none() {
            // Without a token the backend answers 403, which is still reported
            if let Err(e) = self.fetch_csrf_token().await {
                tracing::warn!("CSRF token fetch for {} failed: {}", self.destination_id, e);
            }
        }

        let csrf_token = if mutating {
            self.csrf_token.lock().await.clone()
        } else {
            None
        };

        let header_map = match Self::header_map(headers.as_ref(), body.as_ref(), csrf_token.as_deref()) {
            Ok(map) => map,
            Err(message) => {
                return CallOutcome::TransportError {
                    message,
                    captured: CapturedResponse::default(),
                }
            }
        };

        let mut builder = self.request(http_method(method), &locator).headers(header_map);
        if let Some(body) = body {
            builder = builder.body(body.payload);
        }

        tracing::debug!(
            "{} {} via {} session on {}",
            method,
            locator,
            self.strategy,
            self.destination_id
        );

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                return CallOutcome::TransportError {
                    message: e.to_string(),
                    captured: CapturedResponse::default(),
                }
            }
        };

        let captured = capture_response(response).await;
        self.remember_csrf_token(&captured).await;

        let code = captured.status;
        if code >= 400 && csrf_rejected(&captured) {
            tracing::warn!(
                "{} rejected the CSRF token of the {} session, a new one is needed",
                self.destination_id,
                self.strategy
            );
            self.expire().await;
        }

        if code >= 400 {
            let message = exception_message(&captured.body).unwrap_or_else(|| reason_phrase(code));
            return CallOutcome::StatusError {
                code,
                message,
                captured,
            };
        }

        CallOutcome::Success(captured)
    }
}

/// Session factory backed by the `[destinations]` section of the config
pub struct AdtHttpBackend {
    destinations: HashMap<String, DestinationConfig>,
    timeouts: TimeoutsConfig,
    affine: AffineSessions<AdtSession>,
}

impl AdtHttpBackend {
    pub fn new(destinations: HashMap<String, DestinationConfig>, timeouts: TimeoutsConfig) -> Self {
        Self {
            destinations,
            timeouts,
            affine: AffineSessions::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.destinations.clone(), config.timeouts.clone())
    }

    fn destination_config(&self, destination_id: &str) -> Option<&DestinationConfig> {
        self.destinations.get(destination_id)
    }

    /// Forget an enqueue session whose backend context expired. A session
    /// registered by a concurrent call in the meantime is left alone.
    fn drop_expired_session(&self, destination_id: &str, session: &Arc<AdtSession>) -> bool {
        let dropped = self.affine.remove_if_same(destination_id, session);
        if dropped {
            tracing::info!("Dropped expired enqueue session for destination {}", destination_id);
        }
        dropped
    }

    pub fn clear_sessions(&self) -> usize {
        self.affine.clear()
    }

    pub fn open_sessions(&self) -> usize {
        self.affine.len()
    }
}

#[async_trait]
impl SessionFactory for AdtHttpBackend {
    fn stateless_session(
        &self,
        locator: &str,
        destination: &Destination,
    ) -> Result<Arc<dyn BackendSession>, BridgeError> {
        let config = self.destination_config(&destination.id).ok_or_else(|| {
            BridgeError::Session(format!(
                "no connection configured for destination {}",
                destination.id
            ))
        })?;

        // Fresh cookie jar per call, nothing carries over to the next request
        let session = AdtSession::new(
            &destination.id,
            config,
            SessionStrategy::Stateless,
            &self.timeouts,
        )
        .map_err(|e| BridgeError::Session(e.to_string()))?;

        tracing::debug!("Stateless session for {} on {}", locator, destination.id);
        Ok(Arc::new(session))
    }

    async fn affine_session(
        &self,
        destination: &Destination,
    ) -> Result<Arc<dyn BackendSession>, SessionUnavailable> {
        if let Some(existing) = self.affine.get(&destination.id) {
            if !existing.is_expired() {
                let session: Arc<dyn BackendSession> = existing;
                return Ok(session);
            }
            self.drop_expired_session(&destination.id, &existing);
        }

        let config = self
            .destination_config(&destination.id)
            .ok_or_else(|| SessionUnavailable::UnknownDestination(destination.id.clone()))?;

        if !config.enqueue_sessions {
            return Err(SessionUnavailable::Disabled(destination.id.clone()));
        }

        let session = AdtSession::new(
            &destination.id,
            config,
            SessionStrategy::EnqueueAffine,
            &self.timeouts,
        )
        .map_err(|e| SessionUnavailable::Handshake(e.to_string()))?;

        session
            .fetch_csrf_token()
            .await
            .map_err(SessionUnavailable::Handshake)?;

        let registered = self.affine.insert_or_existing(&destination.id, Arc::new(session));
        tracing::info!("Opened enqueue session for destination {}", destination.id);

        let session: Arc<dyn BackendSession> = registered;
        Ok(session)
    }
}

fn http_method(method: ProxyMethod) -> Method {
    match method {
        ProxyMethod::Get => Method::GET,
        ProxyMethod::Post => Method::POST,
        ProxyMethod::Put => Method::PUT,
        ProxyMethod::Delete => Method::DELETE,
    }
}

/// Read status, headers and the full body of a backend response
pub async fn capture_response(response: Response) -> CapturedResponse {
    let mut captured = CapturedResponse::with_status(response.status().as_u16());

    for (name, value) in response.headers() {
        captured.record_header(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
    }

    match response.bytes().await {
        Ok(bytes) => captured.body = String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => tracing::warn!("Failed to read response body: {}", e),
    }

    captured
}

/// Token values the backend uses to ask for a token rather than hand one out
fn usable_csrf_token(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty()
        || value.eq_ignore_ascii_case("required")
        || value.eq_ignore_ascii_case("fetch")
    {
        None
    } else {
        Some(value.to_string())
    }
}

/// The backend answers `x-csrf-token: Required` when it no longer knows the token
fn csrf_rejected(captured: &CapturedResponse) -> bool {
    captured
        .headers
        .get(CSRF_HEADER)
        .map(|v| v.trim().eq_ignore_ascii_case("required"))
        .unwrap_or(false)
}

/// Message text of an ADT exception document
pub fn exception_message(body: &str) -> Option<String> {
    EXCEPTION_MESSAGE
        .captures(body)
        .and_then(|cap| cap.get(1))
        .map(|m| unescape_xml(m.as_str().trim()))
        .filter(|m| !m.is_empty())
}

pub(crate) fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn reason_phrase(code: u16) -> String {
    StatusCode::from_u16(code)
        .ok()
        .and_then(|status| status.canonical_reason())
        .map(|reason| format!("{} {}", code, reason))
        .unwrap_or_else(|| format!("HTTP {}", code))
}
