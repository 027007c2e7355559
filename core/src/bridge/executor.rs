//! Session-aware executor
//! Resolves the destination, picks a session per method and folds the
//! backend's outcome into a ProxyResponse

use std::sync::Arc;

use crate::bridge::backend::{BackendSession, SessionFactory};
use crate::bridge::capture::Settled;
use crate::bridge::error::BridgeError;
use crate::bridge::translate;
use crate::bridge::types::{Destination, ProxyMethod, ProxyRequest, ProxyResponse, SessionStrategy};
use crate::workspace::DestinationDiscovery;

/// Health summary when no ABAP project is open
pub const NO_PROJECT: &str = "no_adt_project";

pub struct ProxyExecutor {
    discovery: Arc<dyn DestinationDiscovery>,
    sessions: Arc<dyn SessionFactory>,
}

impl ProxyExecutor {
    pub fn new(discovery: Arc<dyn DestinationDiscovery>, sessions: Arc<dyn SessionFactory>) -> Self {
        Self { discovery, sessions }
    }

    /// `connected:<destination>`, `no_adt_project` or `error:<message>`
    pub async fn project_status(&self) -> String {
        match self.discovery.resolve_destination().await {
            Ok(Some(destination)) => format!("connected:{}", destination.id),
            Ok(None) => NO_PROJECT.to_string(),
            Err(e) => format!("error:{}", e),
        }
    }

    /// Run one proxied call against the active destination.
    ///
    /// Backend-reported HTTP errors come back as a normal response carrying
    /// the backend's status. Only a missing destination, an unsupported
    /// method, a session that cannot be created at all, or a transport
    /// failure with nothing captured are returned as errors.
    pub async fn execute_request(&self, request: &ProxyRequest) -> Result<ProxyResponse, BridgeError> {
        let destination = self
            .discovery
            .resolve_destination()
            .await?
            .ok_or(BridgeError::NoDestination)?;

        let method = ProxyMethod::parse(&request.method)?;
        tracing::info!("Request: {} {} -> {}", method, request.path, destination.id);

        let outbound = translate::translate(method, request);
        let session = self.select_session(method, &outbound.locator, &destination).await?;

        match session.call(outbound).await.settle() {
            Settled::CapturedViaObserver {
                response,
                discarded_error,
            } => {
                if let Some(error) = discarded_error {
                    tracing::warn!(
                        "Ignoring deserialization error for {} {}: {}",
                        method,
                        request.path,
                        error
                    );
                }
                Ok(response)
            }
            Settled::CapturedViaErrorCode(response) => {
                tracing::info!(
                    "Backend answered {} {} with {}",
                    method,
                    request.path,
                    response.status
                );
                Ok(response)
            }
            Settled::Failed(message) => {
                tracing::error!("Backend call {} {} failed: {}", method, request.path, message);
                Err(BridgeError::Backend(message))
            }
        }
    }

    async fn select_session(
        &self,
        method: ProxyMethod,
        locator: &str,
        destination: &Destination,
    ) -> Result<Arc<dyn BackendSession>, BridgeError> {
        if SessionStrategy::preferred_for(method) == SessionStrategy::EnqueueAffine {
            if let Some(session) = self.try_affine_session(destination).await {
                return Ok(session);
            }
        }
        self.sessions.stateless_session(locator, destination)
    }

    async fn try_affine_session(&self, destination: &Destination) -> Option<Arc<dyn BackendSession>> {
        match self.sessions.affine_session(destination).await {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("Enqueue session failed, falling back to stateless: {}", e);
                None
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::bridge::capture::{CallOutcome, CapturedResponse};
    use std::sync::atomic::Ordering;

    fn executor(discovery: Arc<StubDiscovery>, backend: Arc<ScriptedBackend>) -> ProxyExecutor {
        ProxyExecutor::new(discovery, backend)
    }

    #[tokio::test]
    async fn test_get_always_uses_stateless_session() {
        let backend = ScriptedBackend::ok("<discovery/>");
        let executor = executor(StubDiscovery::new(DiscoveryScript::Found("DEV")), backend.clone());

        let request = ProxyRequest::new("get", "/sap/bc/adt/discovery")
            .with_header("Accept", "application/atomsvc+xml");
        let response = executor.execute_request(&request).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "<discovery/>");
        assert_eq!(response.headers["content-type"], "application/xml");
        assert_eq!(backend.affine_attempts.load(Ordering::SeqCst), 0);
        assert_eq!(backend.strategies_used(), vec![SessionStrategy::Stateless]);

        let sent = backend.last_request().unwrap();
        assert_eq!(sent.method, ProxyMethod::Get);
        assert!(sent.body.is_none());
    }

    #[tokio::test]
    async fn test_mutating_methods_try_affine_first() {
        for method in ["POST", "PUT", "DELETE"] {
            let backend = ScriptedBackend::ok("");
            let executor = executor(StubDiscovery::new(DiscoveryScript::Found("DEV")), backend.clone());

            executor
                .execute_request(&ProxyRequest::new(method, "/sap/bc/adt/oo/classes/zcl_demo"))
                .await
                .unwrap();

            assert_eq!(backend.affine_attempts.load(Ordering::SeqCst), 1, "{}", method);
            assert_eq!(backend.stateless_created.load(Ordering::SeqCst), 0, "{}", method);
            assert_eq!(backend.strategies_used(), vec![SessionStrategy::EnqueueAffine]);
        }
    }

    #[tokio::test]
    async fn test_affine_failure_falls_back_to_stateless() {
        let backend = ScriptedBackend::new(
            false,
            CallOutcome::Success(CapturedResponse::with_status(200).with_body("<LOCK_HANDLE>X</LOCK_HANDLE>")),
        );
        let executor = executor(StubDiscovery::new(DiscoveryScript::Found("DEV")), backend.clone());

        let request = ProxyRequest::new("POST", "/sap/bc/adt/programs/programs/ztest")
            .with_param("_action", "LOCK")
            .with_param("accessMode", "MODIFY");
        let response = executor.execute_request(&request).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "<LOCK_HANDLE>X</LOCK_HANDLE>");
        assert_eq!(backend.affine_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(backend.strategies_used(), vec![SessionStrategy::Stateless]);

        let sent = backend.last_request().unwrap();
        assert_eq!(
            sent.locator,
            "/sap/bc/adt/programs/programs/ztest?_action=LOCK&accessMode=MODIFY"
        );
    }

    #[tokio::test]
    async fn test_post_with_empty_body_defaults_to_xml() {
        let backend = ScriptedBackend::ok("");
        let executor = executor(StubDiscovery::new(DiscoveryScript::Found("DEV")), backend.clone());

        executor
            .execute_request(&ProxyRequest::new("POST", "/sap/bc/adt/activation"))
            .await
            .unwrap();

        let body = backend.last_request().unwrap().body.unwrap();
        assert_eq!(body.content_type, "application/xml");
        assert!(body.payload.is_empty());
    }

    #[tokio::test]
    async fn test_status_error_becomes_response() {
        let backend = ScriptedBackend::new(
            true,
            CallOutcome::StatusError {
                code: 404,
                message: "not found".to_string(),
                captured: CapturedResponse::default(),
            },
        );
        let executor = executor(StubDiscovery::new(DiscoveryScript::Found("DEV")), backend);

        let response = executor
            .execute_request(&ProxyRequest::new("GET", "/sap/bc/adt/programs/programs/zmissing"))
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(response.body, "not found");
    }

    #[tokio::test]
    async fn test_transport_error_after_capture_is_swallowed() {
        let backend = ScriptedBackend::new(
            true,
            CallOutcome::TransportError {
                message: "cannot deserialize".to_string(),
                captured: CapturedResponse::with_status(200).with_body("<partial"),
            },
        );
        let executor = executor(StubDiscovery::new(DiscoveryScript::Found("DEV")), backend);

        let response = executor
            .execute_request(&ProxyRequest::new("PUT", "/sap/bc/adt/oo/classes/zcl_demo/source/main"))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "<partial");
    }

    #[tokio::test]
    async fn test_transport_error_without_data_is_raised() {
        let backend = ScriptedBackend::new(
            true,
            CallOutcome::TransportError {
                message: "connection reset".to_string(),
                captured: CapturedResponse::default(),
            },
        );
        let executor = executor(StubDiscovery::new(DiscoveryScript::Found("DEV")), backend);

        let err = executor
            .execute_request(&ProxyRequest::new("GET", "/sap/bc/adt/discovery"))
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Backend(_)));
        assert_eq!(err.to_string(), "connection reset");
    }

    #[tokio::test]
    async fn test_no_destination_is_raised_before_any_session() {
        let backend = ScriptedBackend::ok("");
        let executor = executor(StubDiscovery::new(DiscoveryScript::Empty), backend.clone());

        let err = executor
            .execute_request(&ProxyRequest::new("POST", "/sap/bc/adt/activation"))
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::NoDestination));
        assert_eq!(backend.affine_attempts.load(Ordering::SeqCst), 0);
        assert_eq!(backend.stateless_created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let backend = ScriptedBackend::ok("");
        let executor = executor(StubDiscovery::new(DiscoveryScript::Found("DEV")), backend.clone());

        let err = executor
            .execute_request(&ProxyRequest::new("patch", "/sap/bc/adt/discovery"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Unsupported method: PATCH");
        assert!(backend.strategies_used().is_empty());
    }

    #[tokio::test]
    async fn test_destination_resolved_on_every_call() {
        let discovery = StubDiscovery::new(DiscoveryScript::Found("DEV"));
        let executor = executor(discovery.clone(), ScriptedBackend::ok(""));

        for _ in 0..3 {
            executor
                .execute_request(&ProxyRequest::new("GET", "/sap/bc/adt/discovery"))
                .await
                .unwrap();
        }
        assert_eq!(discovery.calls(), 3);
    }

    #[tokio::test]
    async fn test_project_status() {
        let backend = ScriptedBackend::ok("");

        let connected = executor(StubDiscovery::new(DiscoveryScript::Found("DEV")), backend.clone());
        assert_eq!(connected.project_status().await, "connected:DEV");

        let empty = executor(StubDiscovery::new(DiscoveryScript::Empty), backend.clone());
        assert_eq!(empty.project_status().await, "no_adt_project");

        let broken = executor(StubDiscovery::new(DiscoveryScript::Broken), backend);
        assert!(broken.project_status().await.starts_with("error:"));
    }
}
