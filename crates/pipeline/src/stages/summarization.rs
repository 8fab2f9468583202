use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::bus::Delivery;
use crate::cas::update_with_retry;
use crate::engine::Summarizer;
use crate::error::PipelineError;
use crate::kv::KvBucket;
use crate::stages::{Disposition, Stage, record_stage_failure};
use precepto_model::{
    RecordingMetadata, RecordingStatus, TranscriptTemplate, TranscriptionCompleted, subjects,
};

/// Consumes `transcription.completed`: resolves the recording's template,
/// prompts the summarization engine with the transcript, and CAS-updates
/// the record to its final state.
pub struct SummarizationStage {
    recordings: Arc<dyn KvBucket>,
    templates: Arc<dyn KvBucket>,
    summarizer: Arc<dyn Summarizer>,
    cas_max_attempts: u32,
    max_length: u32,
    min_length: u32,
}

impl SummarizationStage {
    pub fn new(
        recordings: Arc<dyn KvBucket>,
        templates: Arc<dyn KvBucket>,
        summarizer: Arc<dyn Summarizer>,
        cas_max_attempts: u32,
        max_length: u32,
        min_length: u32,
    ) -> Self {
        Self {
            recordings,
            templates,
            summarizer,
            cas_max_attempts,
            max_length,
            min_length,
        }
    }

    /// Template absence is a soft condition: missing id, lookup miss and
    /// even a corrupt stored template all fall back to the identity
    /// template rather than failing the stage.
    async fn resolve_template(&self, template_id: Option<&str>) -> String {
        let Some(template_id) = template_id else {
            return TranscriptTemplate::IDENTITY.to_string();
        };
        match self.templates.get(template_id).await {
            Ok(Some(entry)) => match serde_json::from_slice::<TranscriptTemplate>(&entry.value) {
                Ok(template) => template.template,
                Err(e) => {
                    warn!(%template_id, %e, "corrupt template, using identity template");
                    TranscriptTemplate::IDENTITY.to_string()
                }
            },
            Ok(None) => {
                warn!(%template_id, "template not found, using identity template");
                TranscriptTemplate::IDENTITY.to_string()
            }
            Err(e) => {
                warn!(%template_id, %e, "template lookup failed, using identity template");
                TranscriptTemplate::IDENTITY.to_string()
            }
        }
    }
}

#[async_trait]
impl Stage for SummarizationStage {
    fn name(&self) -> &'static str {
        "summarization"
    }

    fn subject(&self) -> &'static str {
        subjects::TRANSCRIPTION_COMPLETED
    }

    async fn handle(&self, delivery: &Delivery) -> Disposition {
        let event: TranscriptionCompleted = match serde_json::from_slice(&delivery.payload) {
            Ok(event) => event,
            Err(e) => {
                error!(%e, "malformed transcription.completed payload dropped");
                return Disposition::Ack;
            }
        };
        let recording_id = event.recording_id.as_str();

        let meta = match self.recordings.get(recording_id).await {
            Ok(Some(entry)) => match serde_json::from_slice::<RecordingMetadata>(&entry.value) {
                Ok(meta) => meta,
                Err(e) => {
                    error!(%recording_id, %e, "corrupt metadata record, dropping event");
                    return Disposition::Ack;
                }
            },
            Ok(None) => {
                info!(%recording_id, "no metadata record, treating event as stale");
                return Disposition::Ack;
            }
            Err(e) => {
                warn!(%recording_id, %e, "metadata read failed, awaiting redelivery");
                return Disposition::Retry;
            }
        };

        let Some(transcript) = meta.transcript else {
            info!(%recording_id, "transcript absent, stale or duplicate event");
            return Disposition::Ack;
        };
        if meta.summary.is_some() && meta.status == RecordingStatus::Complete {
            debug!(%recording_id, "summary already present, duplicate event");
            return Disposition::Ack;
        }
        if meta.status == RecordingStatus::Error {
            // A stored failure is terminal; a redelivered event must not
            // reopen the record.
            info!(%recording_id, "recording already failed, dropping event");
            return Disposition::Ack;
        }

        let template = self.resolve_template(meta.template_id.as_deref()).await;
        let prompt = template.replace(TranscriptTemplate::PLACEHOLDER, &transcript);

        let summary = match self
            .summarizer
            .summarize(&prompt, self.max_length, self.min_length)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                error!(%recording_id, engine = self.summarizer.name(), %e, "summarization failed");
                record_stage_failure(
                    self.recordings.as_ref(),
                    recording_id,
                    RecordingMetadata::STAGE_SUMMARIZATION,
                    self.cas_max_attempts,
                    &format!("summarization failed: {e}"),
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
                    meta.summary = Some(summary.clone());
                    meta.advance(RecordingStatus::Complete);
                    meta.touched_by(RecordingMetadata::STAGE_SUMMARIZATION);
                }
                meta
            },
        )
        .await;

        match written {
            Ok(_) => {
                info!(%recording_id, "summarization complete");
                Disposition::Ack
            }
            Err(e @ PipelineError::ConflictExhausted { .. }) => {
                error!(%recording_id, %e, "metadata update conflicted out");
                record_stage_failure(
                    self.recordings.as_ref(),
                    recording_id,
                    RecordingMetadata::STAGE_SUMMARIZATION,
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
