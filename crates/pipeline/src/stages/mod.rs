pub mod ingestion;
pub mod summarization;
pub mod transcription;

use async_trait::async_trait;
use tracing::{error, info};

pub use ingestion::IngestionStage;
pub use summarization::SummarizationStage;
pub use transcription::TranscriptionStage;

use crate::bus::Delivery;
use crate::cas::update_with_retry;
use crate::kv::KvBucket;
use precepto_model::{RecordingMetadata, RecordingStatus};

/// How a handled delivery is settled. `Ack` covers both success and
/// stored terminal outcomes; `Retry` leaves the message to bus
/// redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Retry,
}

/// One pipeline stage: a subject it consumes and a message handler.
/// Stages hold no per-recording state between invocations.
#[async_trait]
pub trait Stage: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn subject(&self) -> &'static str;

    async fn handle(&self, delivery: &Delivery) -> Disposition;
}

/// Best-effort terminal error write, shared by the inference stages. The
/// triggering message is acked by the caller either way: a stored error
/// is a valid outcome, and if even this write conflicts out there is
/// nothing left to do but log.
pub(crate) async fn record_stage_failure(
    recordings: &dyn KvBucket,
    recording_id: &str,
    stage: &str,
    cas_max_attempts: u32,
    message: &str,
) {
    let stage = stage.to_string();
    let message = message.to_string();
    let result = update_with_retry(
        recordings,
        recording_id,
        cas_max_attempts,
        |mut meta: RecordingMetadata| {
            meta.error_message = Some(message.clone());
            meta.advance(RecordingStatus::Error);
            meta.touched_by(&stage);
            meta
        },
    )
    .await;

    match result {
        Ok(_) => info!(%recording_id, "recording marked failed"),
        Err(e) => error!(%recording_id, %e, "could not record failure status"),
    }
}
