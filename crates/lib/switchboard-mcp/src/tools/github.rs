use rmcp::{ErrorData, model::CallToolResult, tool, tool_router};
use switchboard_core::ToolCall;

use crate::Switchboard;

#[tool_router(router = tool_router_github, vis = "pub")]
impl Switchboard {
    #[tool(description = "Get information about the authenticated GitHub user. Requires GITHUB_TOKEN.")]
    async fn get_user_profile(&self) -> Result<CallToolResult, ErrorData> {
        Ok(self.call(ToolCall::GetUserProfile).await)
    }

    #[tool(description = "List repositories of the authenticated GitHub user. Requires GITHUB_TOKEN.")]
    async fn list_user_repositories(&self) -> Result<CallToolResult, ErrorData> {
        Ok(self.call(ToolCall::ListUserRepositories).await)
    }
}
