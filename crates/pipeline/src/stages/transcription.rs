use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::bus::{Delivery, Headers, MessageBus};
use crate::cas::update_with_retry;
use crate::chunk_store::ChunkStore;
use crate::engine::Transcriber;
use crate::error::PipelineError;
use crate::index::ChunkIndexStore;
use crate::kv::KvBucket;
use crate::stages::{Disposition, Stage, record_stage_failure};
use precepto_model::{
    RecordingCompleted, RecordingMetadata, RecordingStatus, TranscriptionCompleted, subjects,
};

/// Consumes `recording.completed`: validates the chunk index is gap-free,
/// concatenates chunks in sequence order, runs transcription, CAS-updates
/// the metadata record and emits `transcription.completed`.
///
/// Stateless between invocations: when the index is incomplete at trigger
/// time the message is left to redelivery instead of polling.
pub struct TranscriptionStage {
    chunks: Arc<dyn ChunkStore>,
    index: Arc<dyn ChunkIndexStore>,
    recordings: Arc<dyn KvBucket>,
    transcriber: Arc<dyn Transcriber>,
    bus: Arc<dyn MessageBus>,
    cas_max_attempts: u32,
}

impl TranscriptionStage {
    pub fn new(
        chunks: Arc<dyn ChunkStore>,
        index: Arc<dyn ChunkIndexStore>,
        recordings: Arc<dyn KvBucket>,
        transcriber: Arc<dyn Transcriber>,
        bus: Arc<dyn MessageBus>,
        cas_max_attempts: u32,
    ) -> Self {
        Self {
            chunks,
            index,
            recordings,
            transcriber,
            bus,
            cas_max_attempts,
        }
    }

    /// Concatenates chunk payloads by ascending sequence number. Arrival
    /// and wall-clock order play no part in this.
    async fn assemble(
        &self,
        recording_id: &str,
        final_count: u64,
    ) -> Result<Vec<u8>, Disposition> {
        let mut audio = Vec::new();
        for sequence in 0..final_count {
            match self.chunks.read(recording_id, sequence).await {
                Ok(Some(bytes)) => audio.extend_from_slice(&bytes),
                Ok(None) => {
                    warn!(
                        %recording_id,
                        sequence,
                        "indexed chunk missing from store, awaiting redelivery"
                    );
                    return Err(Disposition::Retry);
                }
                Err(e) => {
                    warn!(%recording_id, sequence, %e, "chunk read failed, awaiting redelivery");
                    return Err(Disposition::Retry);
                }
            }
        }
        Ok(audio)
    }

    async fn emit_completed(&self, recording_id: &str) -> Disposition {
        let event = TranscriptionCompleted {
            recording_id: recording_id.to_string(),
        };
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => {
                error!(%recording_id, %e, "could not encode completion event");
                return Disposition::Ack;
            }
        };
        match self
            .bus
            .publish(subjects::TRANSCRIPTION_COMPLETED, Headers::new(), payload)
            .await
        {
            Ok(()) => {
                info!(%recording_id, "transcription completed event emitted");
                Disposition::Ack
            }
            Err(e) => {
                // The transcript is already stored; redelivery will take
                // the duplicate-trigger path and only re-emit the event.
                warn!(%recording_id, %e, "publish failed, awaiting redelivery");
                Disposition::Retry
            }
        }
    }
}

#[async_trait]
impl Stage for TranscriptionStage {
    fn name(&self) -> &'static str {
        "transcription"
    }

    fn subject(&self) -> &'static str {
        subjects::RECORDING_COMPLETED
    }

    async fn handle(&self, delivery: &Delivery) -> Disposition {
        let event: RecordingCompleted = match serde_json::from_slice(&delivery.payload) {
            Ok(event) => event,
            Err(e) => {
                error!(%e, "malformed recording.completed payload dropped");
                return Disposition::Ack;
            }
        };
        let recording_id = event.recording_id.as_str();

        let index = match self.index.load(recording_id).await {
            Ok(index) => index,
            Err(e) => {
                warn!(%recording_id, %e, "index read failed, awaiting redelivery");
                return Disposition::Retry;
            }
        };
        if !index.is_complete() {
            warn!(
                %recording_id,
                final_count = ?index.final_count,
                missing = ?index.missing(),
                "chunk index incomplete at trigger time, awaiting redelivery"
            );
            return Disposition::Retry;
        }
        let Some(final_count) = index.final_count else {
            return Disposition::Retry;
        };

        let meta = match self.recordings.get(recording_id).await {
            Ok(Some(entry)) => match serde_json::from_slice::<RecordingMetadata>(&entry.value) {
                Ok(meta) => meta,
                Err(e) => {
                    error!(%recording_id, %e, "corrupt metadata record, dropping trigger");
                    return Disposition::Ack;
                }
            },
            Ok(None) => {
                warn!(%recording_id, "metadata record not found, awaiting redelivery");
                return Disposition::Retry;
            }
            Err(e) => {
                warn!(%recording_id, %e, "metadata read failed, awaiting redelivery");
                return Disposition::Retry;
            }
        };

        if meta.status == RecordingStatus::Error {
            // A stored failure is terminal; a redelivered trigger must
            // not re-run inference or reopen the record.
            info!(%recording_id, "recording already failed, dropping trigger");
            return Disposition::Ack;
        }
        if meta.transcript.is_some() {
            // Redelivered trigger after a successful write, or a prior
            // instance crashed between the CAS and the publish.
            info!(%recording_id, "transcript already present, re-emitting completion event");
            return self.emit_completed(recording_id).await;
        }

        let audio = match self.assemble(recording_id, final_count).await {
            Ok(audio) => audio,
            Err(disposition) => return disposition,
        };
        info!(
            %recording_id,
            chunks = final_count,
            bytes = audio.len(),
            "recording assembled"
        );

        let transcript = match self.transcriber.transcribe(&audio).await {
            Ok(text) => text,
            Err(e) => {
                error!(%recording_id, engine = self.transcriber.name(), %e, "transcription failed");
                record_stage_failure(
                    self.recordings.as_ref(),
                    recording_id,
                    RecordingMetadata::STAGE_TRANSCRIPTION,
                    self.cas_max_attempts,
                    &format!("transcription failed: {e}"),
                )
                .await;
                return Disposition::Ack;
            }
        };

        let written = update_with_retry(
            self.recordings.as_ref(),
            recording_id,
            self.cas_max_attempts,
            |mut meta: RecordingMetadata| {
                // The record may have gone terminal since the read above;
                // terminal states stay exactly as written.
                if !meta.status.is_terminal() {
                    meta.transcript = Some(transcript.clone());
                    // Complete only once the summary lands; see the
                    // summarization stage.
                    meta.advance(RecordingStatus::Incomplete);
                    meta.touched_by(RecordingMetadata::STAGE_TRANSCRIPTION);
                }
                meta
            },
        )
        .await;

        match written {
            Ok(_) => {
                info!(%recording_id, "transcript stored");
                self.emit_completed(recording_id).await
            }
            Err(e @ PipelineError::ConflictExhausted { .. }) => {
                error!(%recording_id, %e, "metadata update conflicted out");
                record_stage_failure(
                    self.recordings.as_ref(),
                    recording_id,
                    RecordingMetadata::STAGE_TRANSCRIPTION,
                    self.cas_max_attempts,
                    &e.to_string(),
                )
                .await;
                Disposition::Ack
            }
            Err(e) if e.is_transient() => {
                warn!(%recording_id, %e, "metadata update failed, awaiting redelivery");
                Disposition::Retry
            }
            Err(e) => {
                error!(%recording_id, %e, "metadata update failed");
                Disposition::Ack
            }
        }
    }
}
