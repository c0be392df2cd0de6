//! In-process remote store
//!
//! Shared between several engines it behaves like one remote database with
//! several connected sessions. Call counters let tests assert how often the
//! network would have been hit.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::{
    CollectionBody, RecordWrite, RemoteChange, RemoteDocument, RemoteStore, RemoteSubscription,
    VersionToken,
};
use crate::error::RemoteError;

#[derive(Default)]
struct Paths {
    documents: HashMap<String, RemoteDocument>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<RemoteChange>>>,
}

impl Paths {
    fn notify(&mut self, path: &str) {
        let document = self.documents.get(path).cloned();
        if let Some(subscribers) = self.subscribers.get_mut(path) {
            subscribers.retain(|tx| tx.send(RemoteChange::snapshot(document.clone())).is_ok());
        }
    }
}

#[derive(Default)]
pub struct MemoryRemoteStore {
    paths: Mutex<Paths>,
    offline: AtomicBool,
    calls: AtomicUsize,
    batch_writes: AtomicUsize,
    commits: AtomicUsize,
    document_writes: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing the network; every call fails while offline
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Total calls of any kind
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls to `write_batched`
    pub fn batch_writes(&self) -> usize {
        self.batch_writes.load(Ordering::SeqCst)
    }

    /// Chunks committed by `write_batched`
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Calls to `write_document`
    pub fn document_writes(&self) -> usize {
        self.document_writes.load(Ordering::SeqCst)
    }

    /// Live subscriptions on `path`
    pub fn subscriber_count(&self, path: &str) -> usize {
        let paths = match self.paths.lock() {
            Ok(paths) => paths,
            Err(poisoned) => poisoned.into_inner(),
        };
        paths
            .subscribers
            .get(path)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Current document, without counting as a call
    pub fn document(&self, path: &str) -> Option<RemoteDocument> {
        self.paths
            .lock()
            .ok()
            .and_then(|paths| paths.documents.get(path).cloned())
    }

    /// Decoded collection at `path`, without counting as a call
    pub fn collection(&self, path: &str) -> CollectionBody {
        CollectionBody::from_document(self.document(path).as_ref()).unwrap_or_default()
    }

    /// Place a document as another writer would, notifying subscribers
    pub fn put(&self, path: &str, document: RemoteDocument) {
        if let Ok(mut paths) = self.paths.lock() {
            paths.documents.insert(path.to_string(), document);
            paths.notify(path);
        }
    }

    fn begin_call(&self) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("offline".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Paths>, RemoteError> {
        self.paths
            .lock()
            .map_err(|_| RemoteError::Unavailable("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn read_once(&self, path: &str) -> Result<Option<RemoteDocument>, RemoteError> {
        self.begin_call()?;
        Ok(self.lock()?.documents.get(path).cloned())
    }

    async fn subscribe(&self, path: &str) -> Result<RemoteSubscription, RemoteError> {
        self.begin_call()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut paths = self.lock()?;
        let current = paths.documents.get(path).cloned();
        // Receiver is alive, so the initial send cannot fail
        let _ = tx.send(RemoteChange::snapshot(current));
        paths.subscribers.entry(path.to_string()).or_default().push(tx);
        debug!(path, "Subscribed");
        Ok(RemoteSubscription::new(rx))
    }

    async fn write_batched(
        &self,
        path: &str,
        writes: Vec<RecordWrite>,
        version: &VersionToken,
        max_batch_size: usize,
    ) -> Result<(), RemoteError> {
        self.begin_call()?;
        self.batch_writes.fetch_add(1, Ordering::SeqCst);

        let mut writes = writes.into_iter().peekable();
        while writes.peek().is_some() {
            let chunk: Vec<RecordWrite> = writes.by_ref().take(max_batch_size.max(1)).collect();
            let mut paths = self.lock()?;
            let mut body = CollectionBody::from_document(paths.documents.get(path))?;
            let size = chunk.len();
            for write in chunk {
                body.apply(write);
            }
            paths.documents.insert(
                path.to_string(),
                RemoteDocument {
                    version: Some(version.clone()),
                    body: body.to_value()?,
                },
            );
            paths.notify(path);
            self.commits.fetch_add(1, Ordering::SeqCst);
            debug!(path, size, %version, "Committed chunk");
        }
        Ok(())
    }

    async fn write_document(&self, path: &str, document: RemoteDocument) -> Result<(), RemoteError> {
        self.begin_call()?;
        self.document_writes.fetch_add(1, Ordering::SeqCst);
        let mut paths = self.lock()?;
        paths.documents.insert(path.to_string(), document);
        paths.notify(path);
        Ok(())
    }
}
