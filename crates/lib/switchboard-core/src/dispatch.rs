//! Tool registry and per-invocation dispatch.
//!
//! Every invocation resolves to a [`ToolResponse`] holding text; faults are
//! rendered, never propagated.

use std::fmt;

use tracing::{debug, warn};

use crate::connectors::{SearchRequest, github, graph, vector};
use crate::fault::{BackendId, Failure, Fault};
use crate::gateway::Gateway;

/// Registered tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    GetUserProfile,
    ListUserRepositories,
    RunGraphQuery,
    RunRelationalQuery,
    ListVectorCollections,
    SearchVectorCollection,
}

impl Tool {
    pub const ALL: [Self; 6] = [
        Self::GetUserProfile,
        Self::ListUserRepositories,
        Self::RunGraphQuery,
        Self::RunRelationalQuery,
        Self::ListVectorCollections,
        Self::SearchVectorCollection,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetUserProfile => "get_user_profile",
            Self::ListUserRepositories => "list_user_repositories",
            Self::RunGraphQuery => "run_graph_query",
            Self::RunRelationalQuery => "run_relational_query",
            Self::ListVectorCollections => "list_vector_collections",
            Self::SearchVectorCollection => "search_vector_collection",
        }
    }

    #[must_use]
    pub const fn backend(self) -> BackendId {
        match self {
            Self::GetUserProfile | Self::ListUserRepositories => BackendId::GitHub,
            Self::RunGraphQuery => BackendId::Neo4j,
            Self::RunRelationalQuery => BackendId::PostgreSql,
            Self::ListVectorCollections | Self::SearchVectorCollection => BackendId::Milvus,
        }
    }

    /// Verb phrase used when reporting a fault.
    #[must_use]
    pub const fn action(self) -> &'static str {
        match self {
            Self::GetUserProfile => "fetching GitHub user info",
            Self::ListUserRepositories => "fetching GitHub repositories",
            Self::RunGraphQuery => "executing Neo4j query",
            Self::RunRelationalQuery => "executing PostgreSQL statement",
            Self::ListVectorCollections => "listing Milvus collections",
            Self::SearchVectorCollection => "searching Milvus collection",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One invocation with its typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    GetUserProfile,
    ListUserRepositories,
    RunGraphQuery { query: String },
    RunRelationalQuery { query: String },
    ListVectorCollections,
    SearchVectorCollection(SearchRequest),
}

impl ToolCall {
    #[must_use]
    pub const fn tool(&self) -> Tool {
        match self {
            Self::GetUserProfile => Tool::GetUserProfile,
            Self::ListUserRepositories => Tool::ListUserRepositories,
            Self::RunGraphQuery { .. } => Tool::RunGraphQuery,
            Self::RunRelationalQuery { .. } => Tool::RunRelationalQuery,
            Self::ListVectorCollections => Tool::ListVectorCollections,
            Self::SearchVectorCollection(_) => Tool::SearchVectorCollection,
        }
    }

    /// Checks arguments before any backend is touched.
    ///
    /// # Errors
    /// Returns `Fault::InvalidArgument` describing the first bad argument.
    pub fn validate(&self) -> Result<(), Fault> {
        match self {
            Self::RunGraphQuery { query } | Self::RunRelationalQuery { query } => {
                require_text(query, "query")
            }
            Self::SearchVectorCollection(request) => {
                require_text(&request.collection, "collection")?;
                if request.query_vector.is_empty() {
                    return Err(Fault::InvalidArgument("query_vector must not be empty".to_string()));
                }
                if request.top_k == 0 {
                    return Err(Fault::InvalidArgument("top_k must be at least 1".to_string()));
                }
                Ok(())
            }
            Self::GetUserProfile | Self::ListUserRepositories | Self::ListVectorCollections => {
                Ok(())
            }
        }
    }
}

fn require_text(value: &str, name: &str) -> Result<(), Fault> {
    if value.trim().is_empty() {
        return Err(Fault::InvalidArgument(format!("{name} must not be empty")));
    }
    Ok(())
}

/// Terminal state of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Succeeded,
    Rejected,
    Unavailable,
    Faulted,
}

impl Status {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Text result handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResponse {
    pub tool: Tool,
    pub status: Status,
    pub text: String,
}

impl ToolResponse {
    fn resolve(tool: Tool, outcome: Result<String, Fault>) -> Self {
        match outcome {
            Ok(text) => Self {
                tool,
                status: Status::Succeeded,
                text,
            },
            Err(fault) => {
                let status = match fault {
                    Fault::InvalidArgument(_) => Status::Rejected,
                    ref fault if fault.is_unavailable() => Status::Unavailable,
                    _ => Status::Faulted,
                };
                Self {
                    tool,
                    status,
                    text: Failure::new(tool, fault).to_string(),
                }
            }
        }
    }
}

impl Gateway {
    /// Validates, executes, and renders one invocation.
    pub async fn dispatch(&self, call: ToolCall) -> ToolResponse {
        let tool = call.tool();
        let outcome = match call.validate() {
            Ok(()) => self.execute(call).await,
            Err(fault) => Err(fault),
        };
        let response = ToolResponse::resolve(tool, outcome);
        match response.status {
            Status::Succeeded => debug!(tool = tool.name(), backend = %tool.backend(), "tool succeeded"),
            status => warn!(
                tool = tool.name(),
                backend = %tool.backend(),
                ?status,
                error = %response.text,
                "tool did not succeed"
            ),
        }
        response
    }

    async fn execute(&self, call: ToolCall) -> Result<String, Fault> {
        match call {
            ToolCall::GetUserProfile => {
                let profile = self.github().user_profile().await?;
                Ok(profile.render())
            }
            ToolCall::ListUserRepositories => {
                let repos = self.github().repositories().await?;
                Ok(github::render_repositories(&repos))
            }
            ToolCall::RunGraphQuery { query } => {
                let rows = self.graph().run_query(&query).await?;
                Ok(graph::render_records(&rows))
            }
            ToolCall::RunRelationalQuery { query } => {
                let outcome = self.relational().run_statement(&query).await?;
                Ok(outcome.render())
            }
            ToolCall::ListVectorCollections => {
                let collections = self.vector().list_collections().await?;
                Ok(vector::render_collections(&collections))
            }
            ToolCall::SearchVectorCollection(request) => {
                let hits = self.vector().search(&request).await?;
                Ok(vector::render_hits(&request.collection, &hits))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::connectors::{
        BackendFuture,
        GithubConnector,
        GithubSettings,
        GraphConnector,
        GraphSession,
        Probe,
        RelationalConnector,
        RelationalSession,
        RelationalTransaction,
        VectorConnector,
        VectorStore,
    };
    use crate::value::{Row, Value};

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn row(fields: &[(&str, Value)]) -> Row {
        fields
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    /// Graph session that records every native call.
    struct GraphSpy {
        probe: Result<(), Fault>,
        rows: Result<Vec<Row>, Fault>,
        runs: AtomicUsize,
    }

    impl GraphSpy {
        fn new(probe: Result<(), Fault>, rows: Result<Vec<Row>, Fault>) -> Arc<Self> {
            Arc::new(Self {
                probe,
                rows,
                runs: AtomicUsize::new(0),
            })
        }
    }

    impl Probe for GraphSpy {
        fn probe(&self) -> BackendFuture<'_, ()> {
            let result = self.probe.clone();
            Box::pin(async move { result })
        }
    }

    impl GraphSession for GraphSpy {
        fn run<'a>(&'a self, _query: &'a str) -> BackendFuture<'a, Vec<Row>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let rows = self.rows.clone();
            Box::pin(async move { rows })
        }
    }

    #[derive(Default)]
    struct TxLog {
        begun: usize,
        committed: usize,
        rolled_back: usize,
        executed: Vec<String>,
    }

    /// Relational session whose transactions replay a script.
    struct RelationalSpy {
        probe: Result<(), Fault>,
        columns: Vec<String>,
        rows: Vec<Row>,
        fail_on_fetch: Option<Fault>,
        log: Arc<Mutex<TxLog>>,
    }

    impl Probe for RelationalSpy {
        fn probe(&self) -> BackendFuture<'_, ()> {
            let result = self.probe.clone();
            Box::pin(async move { result })
        }
    }

    impl RelationalSession for RelationalSpy {
        fn begin(&self) -> BackendFuture<'_, Box<dyn RelationalTransaction>> {
            self.log.lock().unwrap().begun += 1;
            let tx = ScriptedTx {
                columns: self.columns.clone(),
                rows: self.rows.clone(),
                fail_on_fetch: self.fail_on_fetch.clone(),
                log: self.log.clone(),
            };
            Box::pin(async move { Ok(Box::new(tx) as Box<dyn RelationalTransaction>) })
        }
    }

    struct ScriptedTx {
        columns: Vec<String>,
        rows: Vec<Row>,
        fail_on_fetch: Option<Fault>,
        log: Arc<Mutex<TxLog>>,
    }

    impl RelationalTransaction for ScriptedTx {
        fn columns<'a>(&'a mut self, _statement: &'a str) -> BackendFuture<'a, Vec<String>> {
            let columns = self.columns.clone();
            Box::pin(async move { Ok(columns) })
        }

        fn fetch<'a>(&'a mut self, _statement: &'a str) -> BackendFuture<'a, Vec<Row>> {
            let result = self
                .fail_on_fetch
                .clone()
                .map_or_else(|| Ok(self.rows.clone()), Err);
            Box::pin(async move { result })
        }

        fn execute<'a>(&'a mut self, statement: &'a str) -> BackendFuture<'a, u64> {
            self.log.lock().unwrap().executed.push(statement.to_string());
            Box::pin(async move { Ok(3) })
        }

        fn commit(self: Box<Self>) -> BackendFuture<'static, ()> {
            self.log.lock().unwrap().committed += 1;
            Box::pin(async move { Ok(()) })
        }

        fn rollback(self: Box<Self>) -> BackendFuture<'static, ()> {
            self.log.lock().unwrap().rolled_back += 1;
            Box::pin(async move { Ok(()) })
        }
    }

    /// Vector store tracking loads and releases.
    struct VectorSpy {
        probe: Result<(), Fault>,
        search: Mutex<VecDeque<Result<Vec<Row>, Fault>>>,
        loads: AtomicUsize,
        releases: AtomicUsize,
        searches: AtomicUsize,
        lists: AtomicUsize,
    }

    impl VectorSpy {
        fn new(probe: Result<(), Fault>, search: Vec<Result<Vec<Row>, Fault>>) -> Arc<Self> {
            Arc::new(Self {
                probe,
                search: Mutex::new(search.into()),
                loads: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
                searches: AtomicUsize::new(0),
                lists: AtomicUsize::new(0),
            })
        }

        fn native_calls(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
                + self.releases.load(Ordering::SeqCst)
                + self.searches.load(Ordering::SeqCst)
                + self.lists.load(Ordering::SeqCst)
        }
    }

    impl Probe for VectorSpy {
        fn probe(&self) -> BackendFuture<'_, ()> {
            let result = self.probe.clone();
            Box::pin(async move { result })
        }
    }

    impl VectorStore for VectorSpy {
        fn list_collections(&self) -> BackendFuture<'_, Vec<String>> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(vec!["docs".to_string(), "images".to_string()]) })
        }

        fn load_collection<'a>(&'a self, _collection: &'a str) -> BackendFuture<'a, ()> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(()) })
        }

        fn release_collection<'a>(&'a self, _collection: &'a str) -> BackendFuture<'a, ()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(()) })
        }

        fn search<'a>(&'a self, _request: &'a SearchRequest) -> BackendFuture<'a, Vec<Row>> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            let next = self
                .search
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()));
            Box::pin(async move { next })
        }
    }

    fn github_without_token() -> GithubConnector {
        GithubConnector::connect(&GithubSettings::new(None).with_api_url("http://127.0.0.1:9"))
    }

    fn relational_spy(columns: &[&str], rows: Vec<Row>, fail_on_fetch: Option<Fault>) -> RelationalSpy {
        RelationalSpy {
            probe: Ok(()),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows,
            fail_on_fetch,
            log: Arc::new(Mutex::new(TxLog::default())),
        }
    }

    async fn gateway_with(
        graph: Arc<GraphSpy>,
        relational: Arc<RelationalSpy>,
        vector: Arc<VectorSpy>,
    ) -> Gateway {
        Gateway::new(
            github_without_token(),
            GraphConnector::establish(Ok(graph), TIMEOUT).await,
            RelationalConnector::establish(Ok(relational), TIMEOUT).await,
            VectorConnector::establish(Ok(vector), TIMEOUT).await,
        )
    }

    fn search_request(collection: &str) -> SearchRequest {
        SearchRequest {
            collection: collection.to_string(),
            query_vector: vec![0.1, 0.2, 0.3],
            top_k: 2,
            output_fields: None,
            filter: Some("year > 2000".to_string()),
        }
    }

    #[tokio::test]
    async fn unconnected_backends_short_circuit_without_native_calls() {
        let refused = || Err(Fault::transport("connection refused"));
        let graph = GraphSpy::new(refused(), Ok(Vec::new()));
        let relational = Arc::new(RelationalSpy {
            probe: refused(),
            ..relational_spy(&["n"], Vec::new(), None)
        });
        let relational_log = relational.log.clone();
        let vector = VectorSpy::new(refused(), Vec::new());
        let gateway = gateway_with(graph.clone(), relational, vector.clone()).await;

        let calls = vec![
            ToolCall::RunGraphQuery { query: "MATCH (n) RETURN n".to_string() },
            ToolCall::RunRelationalQuery { query: "SELECT 1".to_string() },
            ToolCall::ListVectorCollections,
            ToolCall::SearchVectorCollection(search_request("docs")),
        ];
        for call in calls {
            let tool = call.tool();
            let response = gateway.dispatch(call).await;
            assert_eq!(response.status, Status::Unavailable, "{tool}");
            assert_eq!(
                response.text,
                format!(
                    "Error: {} backend is unavailable; the startup connection did not succeed. Check the {} connection settings.",
                    tool.backend(),
                    tool.backend()
                )
            );
        }

        assert_eq!(graph.runs.load(Ordering::SeqCst), 0);
        assert_eq!(relational_log.lock().unwrap().begun, 0);
        assert_eq!(vector.native_calls(), 0);
        assert_eq!(gateway.vector().acquired_collections(), 0);
    }

    #[tokio::test]
    async fn graph_query_without_records_reports_no_results() {
        let graph = GraphSpy::new(Ok(()), Ok(Vec::new()));
        let gateway = gateway_with(
            graph.clone(),
            Arc::new(relational_spy(&[], Vec::new(), None)),
            VectorSpy::new(Ok(()), Vec::new()),
        )
        .await;

        let response = gateway
            .dispatch(ToolCall::RunGraphQuery { query: "MATCH (n:Missing) RETURN n".to_string() })
            .await;

        assert_eq!(response.status, Status::Succeeded);
        assert_eq!(response.text, "Query executed successfully, but no results returned.");
        assert_eq!(graph.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn graph_fault_is_distinct_from_empty_result() {
        let graph = GraphSpy::new(Ok(()), Err(Fault::upstream("Invalid input 'MACH'")));
        let gateway = gateway_with(
            graph,
            Arc::new(relational_spy(&[], Vec::new(), None)),
            VectorSpy::new(Ok(()), Vec::new()),
        )
        .await;

        let response = gateway
            .dispatch(ToolCall::RunGraphQuery { query: "MACH (n) RETURN n".to_string() })
            .await;

        assert_eq!(response.status, Status::Faulted);
        assert_eq!(response.text, "Error executing Neo4j query (Neo4j): Invalid input 'MACH'");
    }

    #[tokio::test]
    async fn graph_records_render_one_per_line() {
        let rows = vec![
            row(&[("name", Value::text("Alice")), ("age", Value::Int(30))]),
            row(&[("name", Value::text("Bob")), ("age", Value::Int(41))]),
        ];
        let gateway = gateway_with(
            GraphSpy::new(Ok(()), Ok(rows)),
            Arc::new(relational_spy(&[], Vec::new(), None)),
            VectorSpy::new(Ok(()), Vec::new()),
        )
        .await;

        let response = gateway
            .dispatch(ToolCall::RunGraphQuery { query: "MATCH (p) RETURN p.name AS name, p.age AS age".to_string() })
            .await;

        assert_eq!(
            response.text,
            "Query returned 2 record(s):\n{age: 30, name: \"Alice\"}\n{age: 41, name: \"Bob\"}"
        );
    }

    #[tokio::test]
    async fn relational_statement_without_columns_commits() {
        let relational = Arc::new(relational_spy(&[], Vec::new(), None));
        let log = relational.log.clone();
        let gateway = gateway_with(
            GraphSpy::new(Ok(()), Ok(Vec::new())),
            relational,
            VectorSpy::new(Ok(()), Vec::new()),
        )
        .await;

        let statement = "UPDATE accounts SET active = true";
        let response = gateway
            .dispatch(ToolCall::RunRelationalQuery { query: statement.to_string() })
            .await;

        assert_eq!(response.status, Status::Succeeded);
        assert_eq!(response.text, "Statement executed successfully; 3 row(s) affected.");
        let log = log.lock().unwrap();
        assert_eq!(log.committed, 1);
        assert_eq!(log.rolled_back, 0);
        assert_eq!(log.executed, vec![statement.to_string()]);
    }

    #[tokio::test]
    async fn relational_query_returns_rows_in_column_order() {
        let rows = vec![
            row(&[("id", Value::Int(1)), ("name", Value::text("ada"))]),
            row(&[("id", Value::Int(2)), ("name", Value::Null)]),
        ];
        let relational = Arc::new(relational_spy(&["name", "id"], rows, None));
        let log = relational.log.clone();
        let gateway = gateway_with(
            GraphSpy::new(Ok(()), Ok(Vec::new())),
            relational,
            VectorSpy::new(Ok(()), Vec::new()),
        )
        .await;

        let call = ToolCall::RunRelationalQuery { query: "SELECT name, id FROM users".to_string() };
        let first = gateway.dispatch(call.clone()).await;
        let second = gateway.dispatch(call).await;

        assert_eq!(
            first.text,
            "Query returned 2 row(s):\n{name: \"ada\", id: 1}\n{name: null, id: 2}"
        );
        assert_eq!(first, second);
        assert!(log.lock().unwrap().executed.is_empty());
    }

    #[tokio::test]
    async fn relational_fault_rolls_back() {
        let relational = Arc::new(relational_spy(
            &["total"],
            Vec::new(),
            Some(Fault::upstream("division by zero")),
        ));
        let log = relational.log.clone();
        let gateway = gateway_with(
            GraphSpy::new(Ok(()), Ok(Vec::new())),
            relational,
            VectorSpy::new(Ok(()), Vec::new()),
        )
        .await;

        let response = gateway
            .dispatch(ToolCall::RunRelationalQuery { query: "SELECT 1/0 AS total".to_string() })
            .await;

        assert_eq!(response.status, Status::Faulted);
        assert_eq!(
            response.text,
            "Error executing PostgreSQL statement (PostgreSQL): division by zero"
        );
        let log = log.lock().unwrap();
        assert_eq!(log.rolled_back, 1);
        assert_eq!(log.committed, 0);
    }

    #[tokio::test]
    async fn vector_search_releases_collection_after_success_and_fault() {
        let hit = row(&[("id", Value::Int(7)), ("distance", Value::Float(0.5))]);
        let vector = VectorSpy::new(
            Ok(()),
            vec![Ok(vec![hit]), Err(Fault::upstream("collection not indexed"))],
        );
        let gateway = gateway_with(
            GraphSpy::new(Ok(()), Ok(Vec::new())),
            Arc::new(relational_spy(&[], Vec::new(), None)),
            vector.clone(),
        )
        .await;

        let ok = gateway
            .dispatch(ToolCall::SearchVectorCollection(search_request("docs")))
            .await;
        assert_eq!(ok.status, Status::Succeeded);
        assert_eq!(ok.text, "Found 1 hit(s) in collection docs:\n{distance: 0.5, id: 7}");
        assert_eq!(gateway.vector().acquired_collections(), 0);

        let failed = gateway
            .dispatch(ToolCall::SearchVectorCollection(search_request("docs")))
            .await;
        assert_eq!(failed.status, Status::Faulted);
        assert_eq!(
            failed.text,
            "Error searching Milvus collection (Milvus): collection not indexed"
        );
        assert_eq!(gateway.vector().acquired_collections(), 0);

        assert_eq!(vector.loads.load(Ordering::SeqCst), 2);
        assert_eq!(vector.releases.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn vector_collections_render_one_per_line() {
        let gateway = gateway_with(
            GraphSpy::new(Ok(()), Ok(Vec::new())),
            Arc::new(relational_spy(&[], Vec::new(), None)),
            VectorSpy::new(Ok(()), Vec::new()),
        )
        .await;

        let response = gateway.dispatch(ToolCall::ListVectorCollections).await;
        assert_eq!(response.text, "docs\nimages");
    }

    #[tokio::test]
    async fn invalid_arguments_are_rejected_before_execution() {
        let graph = GraphSpy::new(Ok(()), Ok(Vec::new()));
        let vector = VectorSpy::new(Ok(()), Vec::new());
        let gateway = gateway_with(
            graph.clone(),
            Arc::new(relational_spy(&[], Vec::new(), None)),
            vector.clone(),
        )
        .await;

        let empty_query = gateway
            .dispatch(ToolCall::RunGraphQuery { query: "   ".to_string() })
            .await;
        assert_eq!(empty_query.status, Status::Rejected);
        assert!(empty_query.text.contains("query must not be empty"));

        let mut request = search_request("docs");
        request.top_k = 0;
        let zero_k = gateway.dispatch(ToolCall::SearchVectorCollection(request)).await;
        assert_eq!(zero_k.status, Status::Rejected);
        assert!(zero_k.text.contains("top_k must be at least 1"));

        assert_eq!(graph.runs.load(Ordering::SeqCst), 0);
        assert_eq!(vector.native_calls(), 0);
    }

    #[tokio::test]
    async fn missing_github_token_is_reported_per_call() {
        let gateway = gateway_with(
            GraphSpy::new(Ok(()), Ok(Vec::new())),
            Arc::new(relational_spy(&[], Vec::new(), None)),
            VectorSpy::new(Ok(()), Vec::new()),
        )
        .await;

        for call in [ToolCall::GetUserProfile, ToolCall::ListUserRepositories] {
            let response = gateway.dispatch(call).await;
            assert_eq!(response.status, Status::Unavailable);
            assert_eq!(
                response.text,
                "Error: GITHUB_TOKEN environment variable not set; GitHub tools require it."
            );
        }
    }
}
