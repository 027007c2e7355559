//! Bridge client
//! Finds a running bridge and sends proxy requests through it

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::time::Duration;

use crate::bridge::types::{FieldList, HealthReport, ProxyEnvelope};

const DETECT_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RESOLV_CONF: &str = "/etc/resolv.conf";

static NAMESERVER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"nameserver\s+(\d+\.\d+\.\d+\.\d+)").expect("static regex"));

/// The backend answered a proxied call with a status of 400 or above
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Bridge request failed: {status} {detail}")]
pub struct BridgeRequestError {
    pub status: u16,
    /// Response body, or the bridge's error text when the body is empty
    pub detail: String,
}

#[derive(Clone)]
pub struct BridgeClient {
    base_url: String,
    http_client: Client,
}

impl BridgeClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Locate a running bridge.
    ///
    /// `BRIDGE_URL` is tried first, then localhost and, under WSL2, the
    /// Windows host taken from the resolver configuration.
    pub async fn detect(port: u16) -> Option<Self> {
        let mut candidates = Vec::new();
        if let Ok(url) = std::env::var("BRIDGE_URL") {
            if !url.is_empty() {
                candidates.push(url.trim_end_matches('/').to_string());
            }
        }

        let resolv_conf = std::fs::read_to_string(RESOLV_CONF).unwrap_or_default();
        candidates.extend(
            candidate_hosts(&resolv_conf)
                .into_iter()
                .map(|host| format!("http://{}:{}", host, port)),
        );

        for url in candidates {
            let Ok(client) = Self::new(&url) else {
                continue;
            };
            match client.probe().await {
                Ok(true) => {
                    tracing::info!("ADT bridge detected at {}", url);
                    return Some(client);
                }
                Ok(false) => tracing::debug!("{} answered but is not healthy", url),
                Err(e) => tracing::debug!("No bridge at {}: {}", url, e),
            }
        }

        tracing::warn!("ADT bridge not available");
        None
    }

    async fn probe(&self) -> anyhow::Result<bool> {
        let report: HealthReport = self
            .http_client
            .get(format!("{}/health", self.base_url))
            .timeout(DETECT_TIMEOUT)
            .send()
            .await?
            .json()
            .await?;
        Ok(report.status == "ok")
    }

    pub async fn health(&self) -> anyhow::Result<HealthReport> {
        let response = self
            .http_client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Bridge health check failed with {}", response.status());
        }
        Ok(response.json().await?)
    }

    /// Send one proxy request and return the envelope as-is
    pub async fn send(
        &self,
        method: &str,
        path: &str,
        headers: &FieldList,
        params: &FieldList,
        body: Option<&str>,
    ) -> anyhow::Result<ProxyEnvelope> {
        let payload = serde_json::json!({
            "method": method,
            "path": path,
            "headers": to_object(headers),
            "body": body,
            "params": to_object(params),
        });

        let response = self
            .http_client
            .post(format!("{}/proxy", self.base_url))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Bridge rejected request with {}: {}", status, text);
        }
        Ok(response.json().await?)
    }

    /// Like `send`, but a backend status of 400 or above is a
    /// [`BridgeRequestError`]
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        headers: &FieldList,
        params: &FieldList,
        body: Option<&str>,
    ) -> anyhow::Result<ProxyEnvelope> {
        let envelope = self.send(method, path, headers, params, body).await?;
        if envelope.status >= 400 {
            let detail = if !envelope.body.is_empty() {
                envelope.body
            } else {
                envelope.error.unwrap_or_else(|| "Unknown error".to_string())
            };
            return Err(BridgeRequestError {
                status: envelope.status,
                detail,
            }
            .into());
        }
        Ok(envelope)
    }
}

fn to_object(fields: &FieldList) -> Value {
    let map: Map<String, Value> = fields
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Value::Object(map)
}

/// Hosts to probe, in order: localhost, loopback, then the WSL2 gateway
fn candidate_hosts(resolv_conf: &str) -> Vec<String> {
    let mut hosts = vec!["localhost".to_string(), "127.0.0.1".to_string()];
    if let Some(gateway) = NAMESERVER
        .captures(resolv_conf)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
    {
        if !hosts.contains(&gateway) {
            hosts.push(gateway);
        }
    }
    hosts
}
