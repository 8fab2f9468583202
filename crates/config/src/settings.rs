use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub bus: BusSettings,
    pub store: StoreSettings,
    pub pipeline: PipelineSettings,
    pub transcription: TranscriptionSettings,
    pub summarization: SummarizationSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusSettings {
    /// Queue group shared by instances of the same stage, so the bus
    /// load-balances rather than broadcasts.
    pub queue_group: String,
    /// Redeliveries allowed per message before it is dropped.
    pub max_deliver: u32,
    pub redeliver_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    pub recordings_bucket: String,
    pub templates_bucket: String,
    /// Root directory for the filesystem chunk store.
    pub chunk_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineSettings {
    /// Ceiling for the read-mutate-CAS retry loop.
    pub cas_max_attempts: u32,
    /// Concurrent message handlers per stage process.
    pub max_in_flight: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptionSettings {
    pub endpoint: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizationSettings {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub max_length: u32,
    pub min_length: u32,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("PRECEPTO"),
            )
            .set_default("bus.queue_group", "precepto")?
            .set_default("bus.max_deliver", 50)?
            .set_default("bus.redeliver_delay_ms", 100)?
            .set_default("store.recordings_bucket", "recordings")?
            .set_default("store.templates_bucket", "templates")?
            .set_default("store.chunk_dir", "audio_chunks")?
            .set_default("pipeline.cas_max_attempts", 5)?
            .set_default("pipeline.max_in_flight", 4)?
            .set_default("transcription.endpoint", "http://localhost:9300/transcribe")?
            .set_default("transcription.timeout_secs", 300)?
            .set_default("summarization.endpoint", "http://localhost:9301/summarize")?
            .set_default("summarization.timeout_secs", 120)?
            .set_default("summarization.max_length", 150)?
            .set_default("summarization.min_length", 40)?
            .build()?;

        config.try_deserialize()
    }
}
