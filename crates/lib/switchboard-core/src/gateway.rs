use std::fmt;
use std::time::Duration;

use tracing::info;

use crate::connectors::{
    ConnectReport,
    GithubConnector,
    GithubSettings,
    GraphConnector,
    MilvusSettings,
    Neo4jSettings,
    PostgresSettings,
    RelationalConnector,
    VectorConnector,
};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for every backend the gateway owns.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub github: GithubSettings,
    pub neo4j: Neo4jSettings,
    pub postgres: PostgresSettings,
    pub milvus: MilvusSettings,
    pub connect_timeout: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            github: GithubSettings::new(None),
            neo4j: Neo4jSettings::default(),
            postgres: PostgresSettings::default(),
            milvus: MilvusSettings::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Connection results collected at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    entries: Vec<ConnectReport>,
}

impl StartupReport {
    #[must_use]
    pub fn entries(&self) -> &[ConnectReport] {
        &self.entries
    }

    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.ok).count()
    }
}

impl fmt::Display for StartupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, entry) in self.entries.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Owns one connector per backend.
#[derive(Clone)]
pub struct Gateway {
    github: GithubConnector,
    graph: GraphConnector,
    relational: RelationalConnector,
    vector: VectorConnector,
}

impl Gateway {
    #[must_use]
    pub const fn new(
        github: GithubConnector,
        graph: GraphConnector,
        relational: RelationalConnector,
        vector: VectorConnector,
    ) -> Self {
        Self {
            github,
            graph,
            relational,
            vector,
        }
    }

    /// Connects every backend concurrently.
    ///
    /// Never fails: backends that cannot connect are recorded as unavailable
    /// in the returned report.
    pub async fn connect(settings: &GatewaySettings) -> (Self, StartupReport) {
        let timeout = settings.connect_timeout;
        let github = GithubConnector::connect(&settings.github);
        let (graph, relational, vector) = tokio::join!(
            GraphConnector::connect(&settings.neo4j, timeout),
            RelationalConnector::connect(&settings.postgres, timeout),
            VectorConnector::connect(&settings.milvus, timeout),
        );

        let gateway = Self::new(github, graph, relational, vector);
        let report = gateway.report();
        info!(
            connected = report.connected_count(),
            total = report.entries().len(),
            "gateway startup complete"
        );
        (gateway, report)
    }

    #[must_use]
    pub fn report(&self) -> StartupReport {
        StartupReport {
            entries: vec![
                self.github.connector().report(),
                self.graph.connector().report(),
                self.relational.connector().report(),
                self.vector.connector().report(),
            ],
        }
    }

    #[must_use]
    pub const fn github(&self) -> &GithubConnector {
        &self.github
    }

    #[must_use]
    pub const fn graph(&self) -> &GraphConnector {
        &self.graph
    }

    #[must_use]
    pub const fn relational(&self) -> &RelationalConnector {
        &self.relational
    }

    #[must_use]
    pub const fn vector(&self) -> &VectorConnector {
        &self.vector
    }
}
