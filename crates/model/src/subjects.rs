//! Bus subject and header names shared by all stages.

pub const AUDIO_CHUNK: &str = "audio.chunk";
pub const RECORDING_COMPLETED: &str = "recording.completed";
pub const TRANSCRIPTION_COMPLETED: &str = "transcription.completed";

pub mod headers {
    pub const RECORDING_ID: &str = "recordingId";
    pub const SEQUENCE: &str = "sequence";
    pub const FINAL: &str = "final";
}
