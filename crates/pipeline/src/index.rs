use async_trait::async_trait;
use dashmap::DashMap;
use precepto_model::{ChunkIndex, FinalMark};

use crate::kv::KvError;

/// Result of indexing one chunk arrival.
#[derive(Debug, Clone, Copy)]
pub struct IndexUpdate {
    /// False when the sequence was already present (redelivery).
    pub newly_added: bool,
    /// True for the very first chunk indexed for this recording.
    pub first_for_recording: bool,
}

/// Per-recording chunk index. `add_sequence` must be atomic per recording
/// so that concurrent ingestion instances commute by set union; no CAS is
/// required on this structure.
#[async_trait]
pub trait ChunkIndexStore: Send + Sync {
    async fn add_sequence(&self, recording_id: &str, sequence: u64)
    -> Result<IndexUpdate, KvError>;

    async fn mark_final(&self, recording_id: &str, final_count: u64)
    -> Result<FinalMark, KvError>;

    async fn load(&self, recording_id: &str) -> Result<ChunkIndex, KvError>;
}

#[derive(Default)]
pub struct MemoryChunkIndexStore {
    indexes: DashMap<String, ChunkIndex>,
}

impl MemoryChunkIndexStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkIndexStore for MemoryChunkIndexStore {
    async fn add_sequence(
        &self,
        recording_id: &str,
        sequence: u64,
    ) -> Result<IndexUpdate, KvError> {
        // The entry guard makes the insert atomic for this recording.
        let mut index = self.indexes.entry(recording_id.to_string()).or_default();
        let first = index.received.is_empty() && index.final_count.is_none();
        let newly_added = index.insert(sequence);
        Ok(IndexUpdate {
            newly_added,
            first_for_recording: first && newly_added,
        })
    }

    async fn mark_final(
        &self,
        recording_id: &str,
        final_count: u64,
    ) -> Result<FinalMark, KvError> {
        let mut index = self.indexes.entry(recording_id.to_string()).or_default();
        Ok(index.mark_final(final_count))
    }

    async fn load(&self, recording_id: &str) -> Result<ChunkIndex, KvError> {
        Ok(self
            .indexes
            .get(recording_id)
            .map(|i| i.value().clone())
            .unwrap_or_default())
    }
}
