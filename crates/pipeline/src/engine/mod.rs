pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use http::{HttpSummarizer, HttpTranscriber};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
    #[error("inference failed: {0}")]
    Failed(String),
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

/// Speech-to-text engine: combined audio bytes in, text out. The engine
/// is opaque; internal retry policy, models and formats are its own
/// concern.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, EngineError>;

    /// Human-readable engine name, for logs.
    fn name(&self) -> &str;
}

/// Summarization engine: prompt text in, summary out.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        prompt: &str,
        max_length: u32,
        min_length: u32,
    ) -> Result<String, EngineError>;

    fn name(&self) -> &str;
}
