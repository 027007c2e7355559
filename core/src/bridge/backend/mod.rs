//! Backend session boundary
//! The executor only talks to sessions through these traits

pub mod adt;
pub mod session_manager;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::bridge::capture::CallOutcome;
use crate::bridge::error::BridgeError;
use crate::bridge::translate::OutboundRequest;
use crate::bridge::types::{Destination, SessionStrategy};

pub use adt::AdtHttpBackend;
pub use session_manager::AffineSessions;

/// Why no enqueue-affine session could be handed out
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionUnavailable {
    #[error("no connection configured for destination {0}")]
    UnknownDestination(String),

    #[error("enqueue sessions are disabled for destination {0}")]
    Disabled(String),

    #[error("session handshake failed: {0}")]
    Handshake(String),
}

/// A backend session able to run one call at a time on behalf of the executor
#[async_trait]
pub trait BackendSession: Send + Sync {
    fn strategy(&self) -> SessionStrategy;

    /// Dispatch the call and report what was observed. Never panics on
    /// backend failures; every failure is a `CallOutcome` variant.
    async fn call(&self, request: OutboundRequest) -> CallOutcome;
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    fn stateless_session(
        &self,
        locator: &str,
        destination: &Destination,
    ) -> Result<Arc<dyn BackendSession>, BridgeError>;

    /// Get or create the destination's long-lived enqueue session
    async fn affine_session(
        &self,
        destination: &Destination,
    ) -> Result<Arc<dyn BackendSession>, SessionUnavailable>;
}
