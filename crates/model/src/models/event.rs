use serde::{Deserialize, Serialize};

/// Emitted by the producer once every chunk of a recording has been
/// published. Carries only the id; consumers re-read metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingCompleted {
    pub recording_id: String,
}

/// Emitted by the transcription stage after a successful metadata write.
/// Deliberately small: the transcript lives in the metadata record, not
/// in the event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionCompleted {
    pub recording_id: String,
}
