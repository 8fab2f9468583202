pub mod models;
pub mod subjects;

pub use models::chunk_index::{ChunkIndex, FinalMark};
pub use models::event::{RecordingCompleted, TranscriptionCompleted};
pub use models::recording::{RecordingMetadata, RecordingStatus};
pub use models::template::TranscriptTemplate;
