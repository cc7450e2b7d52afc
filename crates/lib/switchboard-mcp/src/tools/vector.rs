use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use switchboard_core::ToolCall;
use switchboard_core::connectors::SearchRequest;

use crate::{Switchboard, helpers};

/// Parameters for a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SearchParams {
    /// Collection to search.
    pub collection: String,
    /// Query embedding; its dimension must match the collection's vector field.
    pub query_vector: Vec<f32>,
    /// Maximum number of hits, at least 1.
    pub top_k: u32,
    /// Fields to return with each hit.
    pub output_fields: Option<Vec<String>>,
    /// Boolean filter expression applied before the search, e.g. `year > 2000`.
    pub filter_expression: Option<String>,
}

impl From<SearchParams> for SearchRequest {
    fn from(params: SearchParams) -> Self {
        Self {
            collection: params.collection,
            query_vector: params.query_vector,
            top_k: params.top_k,
            output_fields: params.output_fields.filter(|fields| !fields.is_empty()),
            filter: helpers::normalize_optional(params.filter_expression),
        }
    }
}

#[tool_router(router = tool_router_vector, vis = "pub")]
impl Switchboard {
    #[tool(description = "List the collections in the Milvus database.")]
    async fn list_vector_collections(&self) -> Result<CallToolResult, ErrorData> {
        Ok(self.call(ToolCall::ListVectorCollections).await)
    }

    #[tool(description = "Similarity search in a Milvus collection. Loads the collection, searches with query_vector, and releases it again.")]
    async fn search_vector_collection(
        &self,
        Parameters(params): Parameters<SearchParams>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(self
            .call(ToolCall::SearchVectorCollection(params.into()))
            .await)
    }
}
