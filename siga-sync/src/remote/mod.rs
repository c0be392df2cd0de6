//! Remote document store contract
//!
//! The remote side stores two kinds of documents: the resident collection,
//! whose body is a [`CollectionBody`], and the config singleton. Every write
//! carries a [`VersionToken`] so a session can recognize the echo of its own
//! write when the change comes back through a subscription.

mod http;
mod memory;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::RemoteError;

/// Opaque marker identifying one remote write
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    /// Millisecond timestamp plus a random suffix, unique per write
    pub fn generate() -> Self {
        Self(format!(
            "{}-{}",
            chrono::Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VersionToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A versioned JSON document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    #[serde(default)]
    pub version: Option<VersionToken>,
    #[serde(default)]
    pub body: serde_json::Value,
}

/// Body of a collection document.
///
/// Deletions are explicit tombstones in `removed`; a record missing from
/// `records` is never taken to mean it was deleted.
///
/// Tombstones are never compacted: the set holds one id per deleted record
/// for the life of the document. Pruning one would let a session that was
/// offline during the deletion push the record back. Re-adding an id clears
/// its tombstone, so the set only holds records that are currently deleted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionBody {
    #[serde(default)]
    pub records: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub removed: BTreeSet<String>,
}

impl CollectionBody {
    /// Decode the body of an optional document, absent meaning empty
    pub fn from_document(document: Option<&RemoteDocument>) -> Result<Self, RemoteError> {
        match document {
            None => Ok(Self::default()),
            Some(doc) if doc.body.is_null() => Ok(Self::default()),
            Some(doc) => Ok(serde_json::from_value(doc.body.clone())?),
        }
    }

    pub fn apply(&mut self, write: RecordWrite) {
        match write {
            RecordWrite::Upsert { id, body } => {
                self.removed.remove(&id);
                self.records.insert(id, body);
            }
            RecordWrite::Delete { id } => {
                self.records.remove(&id);
                self.removed.insert(id);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_value(&self) -> Result<serde_json::Value, RemoteError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// One record-level write inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum RecordWrite {
    Upsert { id: String, body: serde_json::Value },
    Delete { id: String },
}

impl RecordWrite {
    pub fn id(&self) -> &str {
        match self {
            RecordWrite::Upsert { id, .. } | RecordWrite::Delete { id } => id,
        }
    }
}

/// What a subscription delivers
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteChange {
    /// Current document state; `None` when the document does not exist
    Snapshot {
        document: Option<RemoteDocument>,
        /// The store knows this change came from this client
        is_local_echo: bool,
    },
    /// The read behind this notification failed
    Failed(String),
}

impl RemoteChange {
    pub fn snapshot(document: Option<RemoteDocument>) -> Self {
        RemoteChange::Snapshot {
            document,
            is_local_echo: false,
        }
    }
}

/// Live feed of changes to one path.
///
/// Dropping the subscription unsubscribes immediately.
pub struct RemoteSubscription {
    rx: mpsc::UnboundedReceiver<RemoteChange>,
    task: Option<JoinHandle<()>>,
}

impl RemoteSubscription {
    pub fn new(rx: mpsc::UnboundedReceiver<RemoteChange>) -> Self {
        Self { rx, task: None }
    }

    /// Subscription fed by a background task that is aborted on drop
    pub fn with_task(rx: mpsc::UnboundedReceiver<RemoteChange>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Next change, or `None` once the store closed the feed
    pub async fn next(&mut self) -> Option<RemoteChange> {
        self.rx.recv().await
    }
}

impl Drop for RemoteSubscription {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Document store shared by every session of the village office
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the document at `path` once
    async fn read_once(&self, path: &str) -> Result<Option<RemoteDocument>, RemoteError>;

    /// Subscribe to `path`; the current state is delivered first
    async fn subscribe(&self, path: &str) -> Result<RemoteSubscription, RemoteError>;

    /// Apply record writes to the collection at `path`.
    ///
    /// Writes are committed in chunks of at most `max_batch_size`, one after
    /// another, each stamped with `version`. Subscribers see every commit.
    async fn write_batched(
        &self,
        path: &str,
        writes: Vec<RecordWrite>,
        version: &VersionToken,
        max_batch_size: usize,
    ) -> Result<(), RemoteError>;

    /// Replace the whole document at `path`
    async fn write_document(&self, path: &str, document: RemoteDocument) -> Result<(), RemoteError>;
}
