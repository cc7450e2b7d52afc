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

#[tool_router(router = tool_router_relational, vis = "pub")]
impl Switchboard {
    #[tool(description = "Run a SQL statement against PostgreSQL. Statements without result columns are committed and report the affected row count.")]
    async fn run_relational_query(
        &self,
        Parameters(params): Parameters<QueryParams>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(self
            .call(ToolCall::RunRelationalQuery {
                query: params.query,
            })
            .await)
    }
}
