use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    tool,
    tool_router,
};
use switchboard_core::ToolCall;

use crate::Switchboard;
use crate::tools::QueryParams;

#[tool_router(router = tool_router_graph, vis = "pub")]
impl Switchboard {
    #[tool(description = "Run a Cypher query against the Neo4j database.")]
    async fn run_graph_query(
        &self,
        Parameters(params): Parameters<QueryParams>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(self
            .call(ToolCall::RunGraphQuery {
                query: params.query,
            })
            .await)
    }
}
