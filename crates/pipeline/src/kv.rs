use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("revision mismatch on '{key}': expected {expected}, current {current}")]
    WrongRevision {
        key: String,
        expected: u64,
        current: u64,
    },
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("KV I/O error: {0}")]
    Io(String),
}

/// A stored value together with its opaque revision token.
#[derive(Debug, Clone)]
pub struct KvEntry {
    pub value: Vec<u8>,
    pub revision: u64,
}

/// Narrow contract over one bucket of the external key-value store:
/// plain get/put plus a conditional `update` that succeeds only when the
/// caller echoes the current revision.
#[async_trait]
pub trait KvBucket: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>, KvError>;

    /// Unconditional write. Returns the new revision.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<u64, KvError>;

    /// Compare-and-swap write. Fails with [`KvError::WrongRevision`] when
    /// another writer got in between, [`KvError::NotFound`] when the key
    /// was never written.
    async fn update(
        &self,
        key: &str,
        value: Vec<u8>,
        expected_revision: u64,
    ) -> Result<u64, KvError>;
}

/// In-memory revisioned store, bucket handles keyed by name.
#[derive(Default)]
pub struct MemoryKv {
    buckets: DashMap<String, Arc<MemoryBucket>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, name: &str) -> Arc<MemoryBucket> {
        self.buckets
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryBucket::default()))
            .clone()
    }
}

#[derive(Default)]
pub struct MemoryBucket {
    entries: DashMap<String, KvEntry>,
    revision: AtomicU64,
}

impl MemoryBucket {
    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl KvBucket for MemoryBucket {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>, KvError> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<u64, KvError> {
        let revision = self.next_revision();
        self.entries.insert(key.to_string(), KvEntry { value, revision });
        debug!(%key, revision, "kv put");
        Ok(revision)
    }

    async fn update(
        &self,
        key: &str,
        value: Vec<u8>,
        expected_revision: u64,
    ) -> Result<u64, KvError> {
        // The entry guard holds the shard lock, making the
        // compare-and-swap atomic against concurrent updates.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().revision;
                if current != expected_revision {
                    return Err(KvError::WrongRevision {
                        key: key.to_string(),
                        expected: expected_revision,
                        current,
                    });
                }
                let revision = self.next_revision();
                occupied.insert(KvEntry { value, revision });
                debug!(%key, revision, "kv update");
                Ok(revision)
            }
            Entry::Vacant(_) => Err(KvError::NotFound(key.to_string())),
        }
    }
}
