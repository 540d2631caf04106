//! The contract for a per-user remote store, plus an in-memory implementation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("remote responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to (de)serialize snapshot: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("no credentials available for user {0}")]
    Unauthenticated(String),
    #[error("remote store is offline")]
    Offline,
}

/// One record per user, always read and written whole.
#[async_trait]
pub trait RemoteAdapter<S: crate::Mergeable>: Send + Sync {
    /// The user's snapshot, or `None` if there is no record or the request failed for any reason.
    async fn fetch(&self, user_id: &str) -> Option<S>;

    /// Replace the user's entire record.
    async fn upsert(&self, user_id: &str, snapshot: &S) -> Result<(), RemoteError>;
}

/// A remote store that lives in memory. It can be switched offline to simulate an unreachable backend.
#[derive(Debug)]
pub struct MemoryRemote<S> {
    records: Mutex<HashMap<String, S>>,
    offline: AtomicBool,
    upserts: AtomicUsize,
}

impl<S> Default for MemoryRemote<S> {
    fn default() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            upserts: AtomicUsize::new(0),
        }
    }
}

impl<S: Clone> MemoryRemote<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(user_id: impl Into<String>, snapshot: S) -> Self {
        let remote = Self::default();
        remote.put(user_id, snapshot);
        remote
    }

    pub fn put(&self, user_id: impl Into<String>, snapshot: S) {
        self.lock().insert(user_id.into(), snapshot);
    }

    pub fn get(&self, user_id: &str) -> Option<S> {
        self.lock().get(user_id).cloned()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful upserts so far.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, S>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl<S: crate::Mergeable> RemoteAdapter<S> for MemoryRemote<S> {
    async fn fetch(&self, user_id: &str) -> Option<S> {
        if self.offline.load(Ordering::SeqCst) {
            log::warn!("Fetch for {user_id} failed: {}", RemoteError::Offline);
            return None;
        }
        self.get(user_id)
    }

    async fn upsert(&self, user_id: &str, snapshot: &S) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Offline);
        }
        self.put(user_id, snapshot.clone());
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
