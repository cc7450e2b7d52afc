//! Milvus connector.
//!
//! Talks to the Milvus REST v2 API. A search loads the target collection,
//! holds a lease on it for the duration of the search, and releases it on
//! every exit path once no other search still holds it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connectors::{BackendFuture, Connector, Probe};
use crate::fault::{BackendId, Fault};
use crate::value::{Row, Value, render_rows};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for Milvus.
#[derive(Debug, Clone)]
pub struct MilvusSettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: String,
    pub timeout: Duration,
}

impl Default for MilvusSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 19530,
            user: None,
            password: None,
            database: "default".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl MilvusSettings {
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    fn token(&self) -> Option<String> {
        match (self.user.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) => Some(format!("{user}:{password}")),
            (Some(user), None) => Some(user.to_string()),
            _ => None,
        }
    }
}

/// Similarity search arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub collection: String,
    pub query_vector: Vec<f32>,
    pub top_k: u32,
    pub output_fields: Option<Vec<String>>,
    pub filter: Option<String>,
}

/// Call surface of a vector database handle.
pub trait VectorStore: Probe {
    fn list_collections(&self) -> BackendFuture<'_, Vec<String>>;
    fn load_collection<'a>(&'a self, collection: &'a str) -> BackendFuture<'a, ()>;
    fn release_collection<'a>(&'a self, collection: &'a str) -> BackendFuture<'a, ()>;
    fn search<'a>(&'a self, request: &'a SearchRequest) -> BackendFuture<'a, Vec<Row>>;
}

/// Milvus REST v2 client.
pub struct MilvusStore {
    http: reqwest::Client,
    endpoint: String,
    database: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody<'a> {
    db_name: &'a str,
    collection_name: &'a str,
    data: [&'a [f32]; 1],
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_fields: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a str>,
}

impl MilvusStore {
    /// Builds the HTTP client.
    ///
    /// # Errors
    /// Returns `Fault::Transport` if the client cannot be built.
    pub fn build(settings: &MilvusSettings) -> Result<Self, Fault> {
        let http = reqwest::Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            http,
            endpoint: settings.endpoint(),
            database: settings.database.clone(),
            token: settings.token(),
        })
    }

    async fn call<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<serde_json::Value, Fault> {
        let url = format!("{}{path}", self.endpoint);
        debug!(%url, "calling Milvus API");
        let mut request = self.http.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Fault::Upstream {
                status: Some(status.as_u16()),
                message: text,
            });
        }

        let envelope: Envelope = serde_json::from_str(&text)
            .map_err(|err| Fault::upstream(format!("malformed Milvus response: {err}")))?;
        if envelope.code != 0 {
            let message = envelope.message.unwrap_or_default();
            return Err(Fault::upstream(format!("Milvus error {}: {message}", envelope.code)));
        }
        Ok(envelope.data)
    }

    async fn collection_call(&self, path: &str, collection: &str) -> Result<(), Fault> {
        let body = json!({ "dbName": self.database, "collectionName": collection });
        self.call(path, &body).await.map(|_| ())
    }
}

impl Probe for MilvusStore {
    fn probe(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move { self.list_collections().await.map(|_| ()) })
    }
}

impl VectorStore for MilvusStore {
    fn list_collections(&self) -> BackendFuture<'_, Vec<String>> {
        Box::pin(async move {
            let body = json!({ "dbName": self.database });
            let data = self.call("/v2/vectordb/collections/list", &body).await?;
            serde_json::from_value(data)
                .map_err(|err| Fault::upstream(format!("unexpected collection list: {err}")))
        })
    }

    fn load_collection<'a>(&'a self, collection: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(self.collection_call("/v2/vectordb/collections/load", collection))
    }

    fn release_collection<'a>(&'a self, collection: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(self.collection_call("/v2/vectordb/collections/release", collection))
    }

    fn search<'a>(&'a self, request: &'a SearchRequest) -> BackendFuture<'a, Vec<Row>> {
        Box::pin(async move {
            let body = SearchBody {
                db_name: &self.database,
                collection_name: &request.collection,
                data: [request.query_vector.as_slice()],
                limit: request.top_k,
                output_fields: request.output_fields.as_deref(),
                filter: request.filter.as_deref(),
            };
            let data = self.call("/v2/vectordb/entities/search", &body).await?;
            let hits = match data {
                serde_json::Value::Array(hits) => hits,
                serde_json::Value::Null => Vec::new(),
                other => {
                    return Err(Fault::upstream(format!("unexpected search result: {other}")));
                }
            };
            Ok(hits.into_iter().map(hit_to_row).collect())
        })
    }
}

fn hit_to_row(hit: serde_json::Value) -> Row {
    match Value::from(hit) {
        Value::Map(fields) => fields,
        other => Row::from([("hit".to_string(), other)]),
    }
}

/// Number of in-flight searches holding each loaded collection.
///
/// The lock is held across the native load and release calls, so a release
/// can never overtake a load issued for a later search.
type Holders = Arc<Mutex<HashMap<String, usize>>>;

/// Shared bookkeeping for collections loaded on behalf of searches.
#[derive(Clone)]
struct LoadedCollections {
    holders: Holders,
    acquired: Arc<AtomicUsize>,
}

impl LoadedCollections {
    fn new() -> Self {
        Self {
            holders: Arc::new(Mutex::new(HashMap::new())),
            acquired: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Loads the collection unless another search already holds it.
    async fn acquire(
        &self,
        store: &Arc<dyn VectorStore>,
        collection: &str,
    ) -> Result<CollectionLease, Fault> {
        let mut holders = self.holders.lock().await;
        let count = holders.get(collection).copied().unwrap_or(0);
        if count == 0 {
            store.load_collection(collection).await?;
        }
        holders.insert(collection.to_string(), count + 1);
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(CollectionLease {
            store: store.clone(),
            loaded: self.clone(),
            collection: Some(collection.to_string()),
        })
    }

    /// Drops one hold; the last holder releases the collection natively.
    async fn release(&self, store: &Arc<dyn VectorStore>, collection: &str) -> Result<(), Fault> {
        let mut holders = self.holders.lock().await;
        self.acquired.fetch_sub(1, Ordering::SeqCst);
        let remaining = match holders.get_mut(collection) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => return Ok(()),
        };
        if remaining > 0 {
            debug!(%collection, remaining, "collection still held by other searches");
            return Ok(());
        }
        holders.remove(collection);
        store.release_collection(collection).await
    }
}

/// One search's hold on a loaded collection.
///
/// The release always runs in a spawned task, so it completes even when the
/// search future is dropped (cancellation, panic) at any point.
struct CollectionLease {
    store: Arc<dyn VectorStore>,
    loaded: LoadedCollections,
    collection: Option<String>,
}

impl CollectionLease {
    fn spawn_release(&mut self, deferred: bool) -> Option<JoinHandle<Result<(), Fault>>> {
        let collection = self.collection.take()?;
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(%collection, "no runtime available to release collection");
                return None;
            }
        };
        let store = self.store.clone();
        let loaded = self.loaded.clone();
        Some(runtime.spawn(async move {
            let released = loaded.release(&store, &collection).await;
            if deferred && let Err(err) = &released {
                warn!(%collection, error = %err, "deferred collection release failed");
            }
            released
        }))
    }

    async fn release(mut self) -> Result<(), Fault> {
        match self.spawn_release(false) {
            Some(task) => task
                .await
                .map_err(|err| Fault::transport(format!("collection release task failed: {err}")))?,
            None => Ok(()),
        }
    }
}

impl Drop for CollectionLease {
    fn drop(&mut self) {
        drop(self.spawn_release(true));
    }
}

/// Connector for collection listing and similarity search.
#[derive(Clone)]
pub struct VectorConnector {
    inner: Connector<dyn VectorStore>,
    loaded: LoadedCollections,
}

impl VectorConnector {
    /// Builds the client and probes it; failures leave the connector unavailable.
    pub async fn connect(settings: &MilvusSettings, timeout: Duration) -> Self {
        let opened = MilvusStore::build(settings).map(|store| Arc::new(store) as Arc<dyn VectorStore>);
        Self::establish(opened, timeout).await
    }

    /// Probes an already built store.
    pub async fn establish(opened: Result<Arc<dyn VectorStore>, Fault>, timeout: Duration) -> Self {
        Self::from_connector(Connector::establish(BackendId::Milvus, opened, timeout).await)
    }

    #[must_use]
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::from_connector(Connector::unavailable(BackendId::Milvus, detail))
    }

    fn from_connector(inner: Connector<dyn VectorStore>) -> Self {
        Self {
            inner,
            loaded: LoadedCollections::new(),
        }
    }

    #[must_use]
    pub const fn connector(&self) -> &Connector<dyn VectorStore> {
        &self.inner
    }

    /// Number of collection holds owned by in-flight searches.
    #[must_use]
    pub fn acquired_collections(&self) -> usize {
        self.loaded.acquired.load(Ordering::SeqCst)
    }

    /// Lists collection names.
    ///
    /// # Errors
    /// Returns `BackendUnavailable` when not connected, otherwise the API fault.
    pub async fn list_collections(&self) -> Result<Vec<String>, Fault> {
        let store = self.inner.handle()?;
        store.list_collections().await
    }

    /// Loads the collection, searches it, and releases it again.
    ///
    /// Overlapping searches on one collection share a single load; the
    /// collection is released when the last of them finishes. A search fault
    /// takes precedence over a release fault. A release fault after a
    /// successful search is logged and the hits are still returned.
    ///
    /// # Errors
    /// Returns `BackendUnavailable` when not connected, otherwise the API fault.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<Row>, Fault> {
        let store = self.inner.handle()?;
        let lease = self.loaded.acquire(store, &request.collection).await?;

        let searched = store.search(request).await;
        let released = lease.release().await;

        let hits = searched?;
        if let Err(err) = released {
            warn!(collection = %request.collection, error = %err, "failed to release collection after search");
        }
        Ok(hits)
    }
}

#[must_use]
pub fn render_collections(collections: &[String]) -> String {
    if collections.is_empty() {
        return "No collections found.".to_string();
    }
    collections.join("\n")
}

#[must_use]
pub fn render_hits(collection: &str, hits: &[Row]) -> String {
    if hits.is_empty() {
        return format!("No hits found in collection {collection}.");
    }
    format!(
        "Found {} hit(s) in collection {collection}:\n{}",
        hits.len(),
        render_rows(hits)
    )
}
