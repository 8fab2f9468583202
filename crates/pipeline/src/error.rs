use thiserror::Error;

use crate::bus::BusError;
use crate::chunk_store::ChunkStoreError;
use crate::engine::EngineError;
use crate::kv::KvError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    #[error("KV store error: {0}")]
    Kv(#[from] KvError),
    #[error("chunk store error: {0}")]
    ChunkStore(#[from] ChunkStoreError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("metadata record not found: {0}")]
    RecordNotFound(String),
    #[error("revision conflict on '{key}' persisted after {attempts} attempts")]
    ConflictExhausted { key: String, attempts: u32 },
}

impl PipelineError {
    /// Transient failures are resolved by bus redelivery; everything else
    /// is either terminal for the recording or a handled fallback.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Bus(_) | PipelineError::ChunkStore(_) => true,
            PipelineError::Kv(e) => !matches!(e, KvError::WrongRevision { .. }),
            _ => false,
        }
    }
}
