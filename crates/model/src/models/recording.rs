use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One metadata record per recording, stored JSON-encoded in the
/// `recordings` KV bucket under the recording id. The store revision is
/// carried by the KV entry, not by this struct; application code only
/// echoes it back on conditional writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: RecordingStatus,
    /// Which stage last wrote the record. Provenance for diagnostics and
    /// duplicate-trigger detection.
    pub backend_stage: Option<String>,
    pub template_id: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    #[default]
    Queued,
    Incomplete,
    Complete,
    Error,
}

impl RecordingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RecordingStatus::Complete | RecordingStatus::Error)
    }

    /// Forward-only transition table. Self-transitions are permitted
    /// no-ops; terminal states never change.
    pub fn can_transition(self, to: RecordingStatus) -> bool {
        use RecordingStatus::*;
        match (self, to) {
            (a, b) if a == b => true,
            (Queued, Incomplete | Complete | Error) => true,
            (Incomplete, Complete | Error) => true,
            _ => false,
        }
    }
}

impl RecordingMetadata {
    pub const STAGE_INGESTION: &'static str = "ingestion";
    pub const STAGE_TRANSCRIPTION: &'static str = "transcription";
    pub const STAGE_SUMMARIZATION: &'static str = "summarization";

    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            status: RecordingStatus::Queued,
            backend_stage: None,
            template_id: None,
            transcript: None,
            summary: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a status transition only if it is legal; returns whether
    /// the status changed. Stages never assign `status` directly.
    pub fn advance(&mut self, to: RecordingStatus) -> bool {
        if self.status == to || !self.status.can_transition(to) {
            return false;
        }
        self.status = to;
        true
    }

    /// Records which stage touched the record and when.
    pub fn touched_by(&mut self, stage: &str) {
        self.backend_stage = Some(stage.to_string());
        self.updated_at = Utc::now();
    }
}
