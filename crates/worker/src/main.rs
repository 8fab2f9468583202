use std::sync::Arc;
use std::time::Duration;

use precepto_config::Settings;
use precepto_pipeline::StageRunner;
use precepto_pipeline::bus::MemoryBus;
use precepto_pipeline::chunk_store::FsChunkStore;
use precepto_pipeline::engine::{HttpSummarizer, HttpTranscriber};
use precepto_pipeline::index::MemoryChunkIndexStore;
use precepto_pipeline::kv::MemoryKv;
use precepto_pipeline::stages::{IngestionStage, SummarizationStage, TranscriptionStage};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Single-process deployment: all three stages share one in-process bus
/// and store. Multi-process deployments swap these for the external bus
/// and KV adapters at wiring time; the stages only see the traits.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (silently ignore if missing)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "precepto_worker=debug,precepto_pipeline=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load()?;
    info!(
        chunk_dir = %settings.store.chunk_dir,
        transcription = %settings.transcription.endpoint,
        summarization = %settings.summarization.endpoint,
        "Starting Precepto pipeline worker (in-process bus and store)"
    );

    let bus = Arc::new(MemoryBus::new(
        settings.bus.max_deliver,
        Duration::from_millis(settings.bus.redeliver_delay_ms),
    ));
    let kv = MemoryKv::new();
    let recordings = kv.bucket(&settings.store.recordings_bucket);
    let templates = kv.bucket(&settings.store.templates_bucket);
    let chunks = Arc::new(FsChunkStore::new(settings.store.chunk_dir.clone()).await?);
    let index = Arc::new(MemoryChunkIndexStore::new());

    let transcriber = Arc::new(HttpTranscriber::new(&settings.transcription));
    let summarizer = Arc::new(HttpSummarizer::new(&settings.summarization));

    let ingestion = Arc::new(IngestionStage::new(
        chunks.clone(),
        index.clone(),
        recordings.clone(),
        settings.pipeline.cas_max_attempts,
    ));
    let transcription = Arc::new(TranscriptionStage::new(
        chunks,
        index,
        recordings.clone(),
        transcriber,
        bus.clone(),
        settings.pipeline.cas_max_attempts,
    ));
    let summarization = Arc::new(SummarizationStage::new(
        recordings,
        templates,
        summarizer,
        settings.pipeline.cas_max_attempts,
        settings.summarization.max_length,
        settings.summarization.min_length,
    ));

    let stages: Vec<Arc<dyn precepto_pipeline::Stage>> =
        vec![ingestion, transcription, summarization];
    for stage in stages {
        let runner = StageRunner::new(
            bus.clone(),
            settings.bus.queue_group.clone(),
            settings.pipeline.max_in_flight,
        );
        // Subscriptions are live once `start` returns, so no stage can
        // miss messages published during startup.
        let _handle = runner.start(stage).await?;
    }

    info!("All stages running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    Ok(())
}
