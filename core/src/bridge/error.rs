//! Bridge error types

use thiserror::Error;

use crate::workspace::WorkspaceError;

/// Errors that escape `ProxyExecutor::execute_request`.
///
/// Everything else a backend does wrong is folded into the returned
/// `ProxyResponse`. Transport errors are only raised here when nothing was
/// captured; once any header or body arrived the error is logged and
/// dropped, even if the captured data is incomplete. That can hide a
/// truncated or corrupt response.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No open ABAP project in the workspace
    #[error("No ADT project found in workspace. Open an ABAP project first.")]
    NoDestination,

    /// The workspace could not be inspected
    #[error("Failed to resolve destination: {0}")]
    Discovery(#[from] WorkspaceError),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    /// Not even a stateless session could be created
    #[error("Failed to create backend session: {0}")]
    Session(String),

    /// The backend call failed before any response data was observed
    #[error("{0}")]
    Backend(String),
}

/// Client input errors on /proxy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Missing required field: path")]
    MissingPath,

    #[error("Malformed proxy request: {0}")]
    Malformed(String),
}
