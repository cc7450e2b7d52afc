use std::error::Error;
use std::fmt;

use crate::dispatch::Tool;

/// External system a connector talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendId {
    GitHub,
    Neo4j,
    PostgreSql,
    Milvus,
}

impl BackendId {
    pub const ALL: [Self; 4] = [Self::GitHub, Self::Neo4j, Self::PostgreSql, Self::Milvus];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "GitHub",
            Self::Neo4j => "Neo4j",
            Self::PostgreSql => "PostgreSQL",
            Self::Milvus => "Milvus",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure raised by a connector or by argument validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    ConfigMissing(&'static str),
    BackendUnavailable,
    InvalidArgument(String),
    Upstream { status: Option<u16>, message: String },
    Transport(String),
}

impl Fault {
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            status: None,
            message: message.into(),
        }
    }

    pub fn transport(err: impl fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    /// Whether the fault was raised before any native call was attempted.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::ConfigMissing(_) | Self::BackendUnavailable)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigMissing(setting) => write!(f, "{setting} environment variable not set"),
            Self::BackendUnavailable => f.write_str("backend is not connected"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::Upstream {
                status: Some(status),
                message,
            } => write!(f, "HTTP status {status} - {message}"),
            Self::Upstream {
                status: None,
                message,
            } => f.write_str(message),
            Self::Transport(message) => write!(f, "transport error: {message}"),
        }
    }
}

impl Error for Fault {}

impl From<reqwest::Error> for Fault {
    fn from(err: reqwest::Error) -> Self {
        Self::transport(err)
    }
}

impl From<neo4rs::Error> for Fault {
    fn from(err: neo4rs::Error) -> Self {
        Self::upstream(err.to_string())
    }
}

impl From<sqlx::Error> for Fault {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io) => Self::transport(io),
            sqlx::Error::PoolTimedOut => Self::transport("timed out acquiring a connection"),
            other => Self::upstream(other.to_string()),
        }
    }
}

/// Error record for one failed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub tool: Tool,
    pub fault: Fault,
}

impl Failure {
    #[must_use]
    pub const fn new(tool: Tool, fault: Fault) -> Self {
        Self { tool, fault }
    }

    #[must_use]
    pub const fn backend(&self) -> BackendId {
        self.tool.backend()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backend = self.backend();
        match &self.fault {
            Fault::BackendUnavailable => write!(
                f,
                "Error: {backend} backend is unavailable; the startup connection did not succeed. Check the {backend} connection settings."
            ),
            Fault::ConfigMissing(setting) => write!(
                f,
                "Error: {setting} environment variable not set; {backend} tools require it."
            ),
            fault => write!(f, "Error {} ({backend}): {fault}", self.tool.action()),
        }
    }
}

impl Error for Failure {}
