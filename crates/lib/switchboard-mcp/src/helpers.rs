use rmcp::model::{CallToolResult, Content};
use switchboard_core::ToolResponse;

/// Wraps a dispatch result as a single text content, flagging non-success.
pub fn into_call_result(response: ToolResponse) -> CallToolResult {
    let content = vec![Content::text(response.text)];
    if response.status.is_success() {
        CallToolResult::success(content)
    } else {
        CallToolResult::error(content)
    }
}

/// Treats blank optional strings as absent.
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}
