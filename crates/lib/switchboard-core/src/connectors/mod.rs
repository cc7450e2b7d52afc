//! Backend connectors.
//!
//! Each connector owns the lifecycle of one external backend. Connection is
//! attempted exactly once at startup; a connector that failed to connect keeps
//! no handle, so every later call short-circuits with
//! [`Fault::BackendUnavailable`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::fault::{BackendId, Fault};

pub mod github;
pub mod graph;
pub mod relational;
pub mod vector;

pub use github::{GithubClient, GithubConnector, GithubSettings};
pub use graph::{GraphConnector, GraphSession, Neo4jSession, Neo4jSettings};
pub use relational::{
    PostgresSession,
    PostgresSettings,
    RelationalConnector,
    RelationalSession,
    RelationalTransaction,
    StatementOutcome,
};
pub use vector::{MilvusSettings, MilvusStore, SearchRequest, VectorConnector, VectorStore};

/// Boxed future returned by driver seams.
pub type BackendFuture<'a, T> = BoxFuture<'a, Result<T, Fault>>;

/// Startup handshake against a freshly opened handle.
pub trait Probe: Send + Sync {
    fn probe(&self) -> BackendFuture<'_, ()>;
}

/// Outcome of one startup connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReport {
    pub backend: BackendId,
    pub ok: bool,
    pub detail: String,
}

impl fmt::Display for ConnectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.ok { "connected" } else { "unavailable" };
        write!(f, "{}: {state} ({})", self.backend, self.detail)
    }
}

/// Connection state for one backend.
pub struct Connector<H: ?Sized> {
    backend: BackendId,
    handle: Option<Arc<H>>,
    detail: String,
}

impl<H: ?Sized> Clone for Connector<H> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend,
            handle: self.handle.clone(),
            detail: self.detail.clone(),
        }
    }
}

impl<H: ?Sized> Connector<H> {
    pub fn connected(backend: BackendId, handle: Arc<H>, detail: impl Into<String>) -> Self {
        Self {
            backend,
            handle: Some(handle),
            detail: detail.into(),
        }
    }

    pub fn unavailable(backend: BackendId, detail: impl Into<String>) -> Self {
        Self {
            backend,
            handle: None,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub const fn backend(&self) -> BackendId {
        self.backend
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Returns the live handle.
    ///
    /// # Errors
    /// Returns `Fault::BackendUnavailable` if the startup connection failed.
    pub fn handle(&self) -> Result<&Arc<H>, Fault> {
        self.handle.as_ref().ok_or(Fault::BackendUnavailable)
    }

    #[must_use]
    pub fn report(&self) -> ConnectReport {
        ConnectReport {
            backend: self.backend,
            ok: self.is_connected(),
            detail: self.detail.clone(),
        }
    }
}

impl<H: Probe + ?Sized> Connector<H> {
    /// Probes an opened handle and records the result.
    ///
    /// Faults are logged and turned into an unavailable connector; nothing is
    /// propagated, so one failed backend never blocks the others.
    pub async fn establish(
        backend: BackendId,
        opened: Result<Arc<H>, Fault>,
        timeout: Duration,
    ) -> Self {
        let handle = match opened {
            Ok(handle) => handle,
            Err(fault) => {
                warn!(%backend, error = %fault, "failed to open backend connection");
                return Self::unavailable(backend, fault.to_string());
            }
        };

        match tokio::time::timeout(timeout, handle.probe()).await {
            Ok(Ok(())) => {
                info!(%backend, "connected to backend");
                Self::connected(backend, handle, "connected")
            }
            Ok(Err(fault)) => {
                warn!(%backend, error = %fault, "backend handshake failed");
                Self::unavailable(backend, fault.to_string())
            }
            Err(_) => {
                warn!(%backend, ?timeout, "backend handshake timed out");
                Self::unavailable(backend, format!("handshake timed out after {timeout:?}"))
            }
        }
    }
}
