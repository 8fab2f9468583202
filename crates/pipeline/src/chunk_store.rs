use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ChunkStoreError {
    #[error("chunk store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Composite key under the `chunks` prefix: `{recordingId}_{sequence}`.
pub fn chunk_key(recording_id: &str, sequence: u64) -> String {
    format!("{recording_id}_{sequence}")
}

/// Append-capable byte storage for raw audio chunks. Writes are
/// overwrite-safe so redelivered chunks cannot corrupt state; the
/// pipeline never deletes (retention is external).
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn write(
        &self,
        recording_id: &str,
        sequence: u64,
        payload: &[u8],
    ) -> Result<(), ChunkStoreError>;

    async fn read(
        &self,
        recording_id: &str,
        sequence: u64,
    ) -> Result<Option<Vec<u8>>, ChunkStoreError>;
}

#[derive(Default)]
pub struct MemoryChunkStore {
    chunks: DashMap<String, Vec<u8>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn write(
        &self,
        recording_id: &str,
        sequence: u64,
        payload: &[u8],
    ) -> Result<(), ChunkStoreError> {
        self.chunks
            .insert(chunk_key(recording_id, sequence), payload.to_vec());
        Ok(())
    }

    async fn read(
        &self,
        recording_id: &str,
        sequence: u64,
    ) -> Result<Option<Vec<u8>>, ChunkStoreError> {
        Ok(self
            .chunks
            .get(&chunk_key(recording_id, sequence))
            .map(|c| c.value().clone()))
    }
}

/// One file per chunk under a root directory.
pub struct FsChunkStore {
    root: PathBuf,
}

impl FsChunkStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, ChunkStoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path(&self, recording_id: &str, sequence: u64) -> PathBuf {
        self.root
            .join(format!("{}.webm", chunk_key(recording_id, sequence)))
    }
}

#[async_trait]
impl ChunkStore for FsChunkStore {
    async fn write(
        &self,
        recording_id: &str,
        sequence: u64,
        payload: &[u8],
    ) -> Result<(), ChunkStoreError> {
        let path = self.path(recording_id, sequence);
        tokio::fs::write(&path, payload).await?;
        debug!(path = %path.display(), bytes = payload.len(), "chunk written");
        Ok(())
    }

    async fn read(
        &self,
        recording_id: &str,
        sequence: u64,
    ) -> Result<Option<Vec<u8>>, ChunkStoreError> {
        match tokio::fs::read(self.path(recording_id, sequence)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
