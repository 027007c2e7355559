//! Bridge module - local HTTP bridge into ADT backend sessions

pub mod types;
pub mod error;
pub mod translate;
pub mod capture;
pub mod backend;
pub mod executor;
pub mod server;
pub mod handlers;

pub use backend::{AdtHttpBackend, SessionFactory};
pub use error::BridgeError;
pub use executor::ProxyExecutor;
pub use server::BridgeServer;
pub use types::{Destination, ProxyEnvelope, ProxyMethod, ProxyRequest, ProxyResponse};
