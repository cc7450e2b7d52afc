//! MCP server implementation for switchboard.
//!
//! This crate wires the gateway's tool registry into rmcp tool handlers, one
//! router per backend, and exposes the stdio and streamable HTTP runners.

mod helpers;
mod tools;
pub mod server;

use std::sync::Arc;

use rmcp::{
    ErrorData,
    ServerHandler,
    handler::server::tool::ToolRouter,
    tool,
    tool_handler,
    tool_router,
};
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use switchboard_core::{Gateway, ToolCall};

pub use tools::{QueryParams, SearchParams};

const SERVER_INSTRUCTIONS: &str = r"switchboard forwards tool calls to GitHub, Neo4j, PostgreSQL, and Milvus.

Tools:
- `get_user_profile`, `list_user_repositories`: the GitHub user behind GITHUB_TOKEN.
- `run_graph_query`: run a Cypher query against Neo4j.
- `run_relational_query`: run one SQL statement against PostgreSQL. Statements that return no
  columns are committed; the text reports the affected row count.
- `list_vector_collections`, `search_vector_collection`: list Milvus collections and run a
  similarity search with `collection`, `query_vector`, `top_k`, optional `output_fields` and
  `filter_expression`.

Notes:
- Every tool answers with text. Failures start with `Error` and name the backend.
- A backend that failed to connect at startup stays unavailable until restart; call
  `backend_status` to see which backends are connected.
- `health` returns `ok`.";

/// MCP server wrapper around the gateway and tool routers.
#[derive(Clone)]
pub struct Switchboard {
    tool_router: ToolRouter<Self>,
    gateway: Arc<Gateway>,
}

impl Switchboard {
    /// Creates a new server owning the gateway.
    #[must_use]
    pub fn new(gateway: Gateway) -> Self {
        Self::with_gateway(Arc::new(gateway))
    }

    /// Creates a new server using a shared gateway handle.
    #[must_use]
    pub fn with_gateway(gateway: Arc<Gateway>) -> Self {
        let tool_router = Self::tool_router_core()
            + Self::tool_router_github()
            + Self::tool_router_graph()
            + Self::tool_router_relational()
            + Self::tool_router_vector();
        Self {
            tool_router,
            gateway,
        }
    }

    /// Names of every registered tool, sorted.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        names
    }

    pub(crate) async fn call(&self, call: ToolCall) -> CallToolResult {
        helpers::into_call_result(self.gateway.dispatch(call).await)
    }
}

#[tool_router(router = tool_router_core, vis = "pub")]
impl Switchboard {
    #[tool(description = "Health check. Returns 'ok'.")]
    async fn health(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::text("ok")]))
    }

    #[tool(description = "Report which backends connected at startup.")]
    async fn backend_status(&self) -> Result<CallToolResult, ErrorData> {
        let report = self.gateway.report();
        Ok(CallToolResult::success(vec![Content::text(report.to_string())]))
    }
}

#[tool_handler]
impl ServerHandler for Switchboard {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::Tool;
    use switchboard_core::connectors::{
        GithubConnector,
        GithubSettings,
        GraphConnector,
        RelationalConnector,
        VectorConnector,
    };

    fn offline_switchboard() -> Switchboard {
        Switchboard::new(Gateway::new(
            GithubConnector::connect(&GithubSettings::new(None)),
            GraphConnector::unavailable("offline"),
            RelationalConnector::unavailable("offline"),
            VectorConnector::unavailable("offline"),
        ))
    }

    #[test]
    fn registers_every_gateway_tool() {
        let names = offline_switchboard().tool_names();
        for tool in Tool::ALL {
            assert!(names.contains(&tool.name().to_string()), "missing {tool}");
        }
        assert!(names.contains(&"health".to_string()));
        assert!(names.contains(&"backend_status".to_string()));
        assert_eq!(names.len(), Tool::ALL.len() + 2);
    }

    #[tokio::test]
    async fn unavailable_backends_answer_with_error_text() {
        let server = offline_switchboard();
        let result = server
            .call(ToolCall::RunGraphQuery {
                query: "RETURN 1".to_string(),
            })
            .await;

        assert_eq!(result.is_error, Some(true));
        let text = result.content[0]
            .as_text()
            .map(|text| text.text.clone())
            .unwrap_or_default();
        assert!(text.starts_with("Error: Neo4j backend is unavailable"), "{text}");
    }

    #[tokio::test]
    async fn backend_status_lists_startup_report() {
        let server = offline_switchboard();
        let result = server.backend_status().await.expect("status tool");
        let text = result.content[0]
            .as_text()
            .map(|text| text.text.clone())
            .unwrap_or_default();
        assert!(text.contains("GitHub: connected"), "{text}");
        assert!(text.contains("Neo4j: unavailable (offline)"), "{text}");
        assert!(text.contains("Milvus: unavailable (offline)"), "{text}");
    }
}
