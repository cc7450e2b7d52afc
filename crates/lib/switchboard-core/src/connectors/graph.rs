//! Neo4j connector.

use std::sync::Arc;
use std::time::Duration;

use neo4rs::{Graph, query};

use crate::connectors::{BackendFuture, Connector, Probe};
use crate::fault::{BackendId, Fault};
use crate::value::Row;

/// Connection settings for Neo4j.
#[derive(Debug, Clone)]
pub struct Neo4jSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
        }
    }
}

/// Query surface of a graph database handle.
///
/// Every call runs in its own session; implementations must release that
/// session on every exit path.
pub trait GraphSession: Probe {
    fn run<'a>(&'a self, query: &'a str) -> BackendFuture<'a, Vec<Row>>;
}

/// `neo4rs` backed session source.
pub struct Neo4jSession {
    graph: Graph,
}

impl Neo4jSession {
    /// Opens the driver handle.
    ///
    /// # Errors
    /// Returns a fault if the driver rejects the settings or cannot connect.
    pub async fn open(settings: &Neo4jSettings) -> Result<Self, Fault> {
        let graph = Graph::new(
            settings.uri.as_str(),
            settings.user.as_str(),
            settings.password.as_str(),
        )
        .await?;
        Ok(Self { graph })
    }
}

impl Probe for Neo4jSession {
    fn probe(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.graph.run(query("RETURN 1")).await?;
            Ok(())
        })
    }
}

impl GraphSession for Neo4jSession {
    fn run<'a>(&'a self, statement: &'a str) -> BackendFuture<'a, Vec<Row>> {
        Box::pin(async move {
            // The stream owns a pooled connection and hands it back when dropped.
            let mut stream = self.graph.execute(query(statement)).await?;
            let mut rows = Vec::new();
            while let Some(record) = stream.next().await? {
                let row = record
                    .to::<Row>()
                    .map_err(|err| Fault::upstream(format!("unreadable record: {err}")))?;
                rows.push(row);
            }
            Ok(rows)
        })
    }
}

/// Connector for Cypher queries.
#[derive(Clone)]
pub struct GraphConnector {
    inner: Connector<dyn GraphSession>,
}

impl GraphConnector {
    /// Opens and probes a Neo4j handle; failures leave the connector unavailable.
    pub async fn connect(settings: &Neo4jSettings, timeout: Duration) -> Self {
        let opened = tokio::time::timeout(timeout, Neo4jSession::open(settings))
            .await
            .unwrap_or_else(|_| Err(Fault::transport(format!("connect timed out after {timeout:?}"))))
            .map(|session| Arc::new(session) as Arc<dyn GraphSession>);
        Self::establish(opened, timeout).await
    }

    /// Probes an already opened session.
    pub async fn establish(opened: Result<Arc<dyn GraphSession>, Fault>, timeout: Duration) -> Self {
        Self {
            inner: Connector::establish(BackendId::Neo4j, opened, timeout).await,
        }
    }

    #[must_use]
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            inner: Connector::unavailable(BackendId::Neo4j, detail),
        }
    }

    #[must_use]
    pub const fn connector(&self) -> &Connector<dyn GraphSession> {
        &self.inner
    }

    /// Runs a Cypher query and collects every record in order.
    ///
    /// # Errors
    /// Returns `BackendUnavailable` when not connected, otherwise the driver fault.
    pub async fn run_query(&self, statement: &str) -> Result<Vec<Row>, Fault> {
        let session = self.inner.handle()?;
        session.run(statement).await
    }
}

#[must_use]
pub fn render_records(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "Query executed successfully, but no results returned.".to_string();
    }
    format!(
        "Query returned {} record(s):\n{}",
        rows.len(),
        crate::value::render_rows(rows)
    )
}
