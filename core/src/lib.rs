//! ADT Bridge Core Library
//! Request translation, session-aware execution and the local HTTP bridge

pub mod config;
pub mod workspace;
pub mod bridge;
pub mod client;
pub mod objects;
