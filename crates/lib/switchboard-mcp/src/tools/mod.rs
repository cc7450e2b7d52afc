//! MCP tool modules.
//!
//! Tools are grouped by backend: GitHub, the Neo4j graph, PostgreSQL, and
//! Milvus vector search.

use rmcp::schemars;
use serde::{Deserialize, Serialize};

mod github;
mod graph;
mod relational;
mod vector;

pub use vector::SearchParams;

/// Parameters for tools that run a caller-supplied query string.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct QueryParams {
    /// Query text passed to the backend unchanged.
    pub query: String,
}
