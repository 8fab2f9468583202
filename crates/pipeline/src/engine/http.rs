use std::time::Duration;

use async_trait::async_trait;
use precepto_config::{SummarizationSettings, TranscriptionSettings};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{EngineError, Summarizer, Transcriber};

/// Remote speech-to-text over HTTP: posts the combined audio bytes and
/// expects `{"text": ...}`. The whole call is bounded by the configured
/// timeout; a timeout counts as an engine failure.
pub struct HttpTranscriber {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
}

impl HttpTranscriber {
    pub fn new(settings: &TranscriptionSettings) -> Self {
        Self {
            client: Client::new(),
            endpoint: settings.endpoint.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    async fn request(&self, audio: &[u8]) -> Result<String, EngineError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::Failed(format!(
                "transcription endpoint returned {}",
                response.status()
            )));
        }

        let body: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Failed(e.to_string()))?;
        Ok(body.text)
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, EngineError> {
        debug!(bytes = audio.len(), endpoint = %self.endpoint, "transcribing");
        tokio::time::timeout(self.timeout, self.request(audio))
            .await
            .map_err(|_| EngineError::Timeout(self.timeout))?
    }

    fn name(&self) -> &str {
        "http_transcriber"
    }
}

/// Remote summarization over HTTP: posts
/// `{"text", "max_length", "min_length"}` and expects
/// `{"summary_text": ...}`.
pub struct HttpSummarizer {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SummarizeResponse {
    summary_text: String,
}

impl HttpSummarizer {
    pub fn new(settings: &SummarizationSettings) -> Self {
        Self {
            client: Client::new(),
            endpoint: settings.endpoint.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    async fn request(
        &self,
        prompt: &str,
        max_length: u32,
        min_length: u32,
    ) -> Result<String, EngineError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "text": prompt,
                "max_length": max_length,
                "min_length": min_length,
            }))
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::Failed(format!(
                "summarization endpoint returned {}",
                response.status()
            )));
        }

        let body: SummarizeResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Failed(e.to_string()))?;
        Ok(body.summary_text)
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(
        &self,
        prompt: &str,
        max_length: u32,
        min_length: u32,
    ) -> Result<String, EngineError> {
        debug!(chars = prompt.len(), endpoint = %self.endpoint, "summarizing");
        tokio::time::timeout(self.timeout, self.request(prompt, max_length, min_length))
            .await
            .map_err(|_| EngineError::Timeout(self.timeout))?
    }

    fn name(&self) -> &str {
        "http_summarizer"
    }
}
