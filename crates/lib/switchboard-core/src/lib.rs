//! Core types and services for switchboard.
//!
//! This crate owns the backend connectors (GitHub, Neo4j, PostgreSQL, Milvus),
//! the [`Gateway`](gateway::Gateway) that holds one connector per backend, and
//! the tool registry that turns every invocation into a text response.

pub mod connectors;
pub mod dispatch;
pub mod fault;
pub mod gateway;
pub mod value;

pub use dispatch::{Status, Tool, ToolCall, ToolResponse};
pub use fault::{BackendId, Failure, Fault};
pub use gateway::{Gateway, GatewaySettings, StartupReport};
