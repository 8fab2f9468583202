use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::bus::Delivery;
use crate::cas::update_with_retry;
use crate::chunk_store::ChunkStore;
use crate::error::PipelineError;
use crate::index::ChunkIndexStore;
use crate::kv::KvBucket;
use crate::stages::{Disposition, Stage};
use precepto_model::{FinalMark, RecordingMetadata, RecordingStatus, subjects};

/// Consumes `audio.chunk` messages: persists the payload, indexes the
/// sequence, and records the terminal marker. Never triggers assembly —
/// that is signaled by a dedicated `recording.completed` message, so
/// chunk volume stays decoupled from the triggering event.
pub struct IngestionStage {
    chunks: Arc<dyn ChunkStore>,
    index: Arc<dyn ChunkIndexStore>,
    recordings: Arc<dyn KvBucket>,
    cas_max_attempts: u32,
}

struct ChunkMessage {
    recording_id: String,
    sequence: u64,
    is_final: bool,
}

impl IngestionStage {
    pub fn new(
        chunks: Arc<dyn ChunkStore>,
        index: Arc<dyn ChunkIndexStore>,
        recordings: Arc<dyn KvBucket>,
        cas_max_attempts: u32,
    ) -> Self {
        Self {
            chunks,
            index,
            recordings,
            cas_max_attempts,
        }
    }

    fn parse(delivery: &Delivery) -> Result<ChunkMessage, String> {
        let recording_id = delivery
            .header(subjects::headers::RECORDING_ID)
            .ok_or("missing recordingId header")?
            .to_string();
        let sequence = delivery
            .header(subjects::headers::SEQUENCE)
            .ok_or("missing sequence header")?
            .parse::<u64>()
            .map_err(|e| format!("bad sequence header: {e}"))?;
        let is_final = match delivery.header(subjects::headers::FINAL) {
            Some(raw) => raw
                .parse::<bool>()
                .map_err(|e| format!("bad final header: {e}"))?,
            None => false,
        };
        if delivery.payload.is_empty() {
            return Err("empty chunk payload".to_string());
        }
        Ok(ChunkMessage {
            recording_id,
            sequence,
            is_final,
        })
    }

    /// First indexed chunk for a recording: advance queued → incomplete.
    /// Best-effort — the registration write may still be in flight, and
    /// the transcription stage advances the record again later.
    async fn mark_ingestion_started(&self, recording_id: &str) {
        let result = update_with_retry(
            self.recordings.as_ref(),
            recording_id,
            self.cas_max_attempts,
            |mut meta: RecordingMetadata| {
                meta.advance(RecordingStatus::Incomplete);
                meta.touched_by(RecordingMetadata::STAGE_INGESTION);
                meta
            },
        )
        .await;

        match result {
            Ok(_) => debug!(%recording_id, "ingestion started"),
            Err(PipelineError::RecordNotFound(_)) => {
                warn!(%recording_id, "no metadata record yet, ingestion proceeds without it")
            }
            Err(e) => warn!(%recording_id, %e, "could not mark ingestion started"),
        }
    }
}

#[async_trait]
impl Stage for IngestionStage {
    fn name(&self) -> &'static str {
        "ingestion"
    }

    fn subject(&self) -> &'static str {
        subjects::AUDIO_CHUNK
    }

    async fn handle(&self, delivery: &Delivery) -> Disposition {
        let msg = match Self::parse(delivery) {
            Ok(msg) => msg,
            Err(reason) => {
                // A message that can never parse must not redeliver forever.
                error!(%reason, "malformed chunk message dropped");
                return Disposition::Ack;
            }
        };

        if let Err(e) = self
            .chunks
            .write(&msg.recording_id, msg.sequence, &delivery.payload)
            .await
        {
            warn!(
                recording_id = %msg.recording_id,
                sequence = msg.sequence,
                %e,
                "chunk write failed, awaiting redelivery"
            );
            return Disposition::Retry;
        }

        match self.index.add_sequence(&msg.recording_id, msg.sequence).await {
            Ok(update) => {
                if !update.newly_added {
                    debug!(
                        recording_id = %msg.recording_id,
                        sequence = msg.sequence,
                        "duplicate chunk, index unchanged"
                    );
                }
                if update.first_for_recording {
                    self.mark_ingestion_started(&msg.recording_id).await;
                }
            }
            Err(e) => {
                warn!(recording_id = %msg.recording_id, %e, "index update failed, awaiting redelivery");
                return Disposition::Retry;
            }
        }

        if msg.is_final {
            match self
                .index
                .mark_final(&msg.recording_id, msg.sequence + 1)
                .await
            {
                Ok(FinalMark::Recorded) => {
                    info!(
                        recording_id = %msg.recording_id,
                        final_count = msg.sequence + 1,
                        "terminal marker recorded"
                    );
                }
                Ok(FinalMark::Duplicate) => {
                    info!(recording_id = %msg.recording_id, "duplicate terminal marker ignored");
                }
                Err(e) => {
                    warn!(recording_id = %msg.recording_id, %e, "terminal marker write failed, awaiting redelivery");
                    return Disposition::Retry;
                }
            }
        }

        Disposition::Ack
    }
}
