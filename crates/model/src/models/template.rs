use serde::{Deserialize, Serialize};

/// User-defined summarization template, stored JSON-encoded in the
/// `templates` KV bucket. `template` carries a `{transcript}` placeholder
/// that the summarization stage substitutes before prompting the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptTemplate {
    pub id: String,
    pub name: String,
    pub template: String,
    pub created_by_id: String,
}

impl TranscriptTemplate {
    /// Fallback when no template is configured or lookup misses: the
    /// transcript itself becomes the prompt.
    pub const IDENTITY: &'static str = "{transcript}";
    pub const PLACEHOLDER: &'static str = "{transcript}";
}
