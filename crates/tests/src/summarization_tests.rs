use crate::fixtures::engines::{FakeSummarizer, FakeTranscriber};
use crate::fixtures::test_pipeline::TestPipeline;
use precepto_model::RecordingStatus;
use precepto_pipeline::stages::Disposition;

/// Runs ingestion and transcription so the record carries a transcript.
async fn transcribed_recording(pipeline: &TestPipeline, id: &str, template_id: Option<&str>) {
    pipeline.seed_recording(id, template_id).await;
    pipeline.ingest_chunk(id, 0, false, b"a").await;
    pipeline.ingest_chunk(id, 1, false, b"b").await;
    pipeline.ingest_chunk(id, 2, true, b"c").await;
    assert_eq!(pipeline.trigger_transcription(id).await, Disposition::Ack);
}

#[tokio::test]
async fn template_is_applied_and_record_completes() {
    let pipeline = TestPipeline::new();
    pipeline.seed_template("t1", "{transcript}!").await;
    transcribed_recording(&pipeline, "r1", Some("t1")).await;

    assert_eq!(pipeline.trigger_summarization("r1").await, Disposition::Ack);

    let meta = pipeline.metadata("r1").await;
    assert_eq!(meta.status, RecordingStatus::Complete);
    assert_eq!(meta.summary.as_deref(), Some("hello world!"));
    assert_eq!(meta.backend_stage.as_deref(), Some("summarization"));
}

#[tokio::test]
async fn missing_template_falls_back_to_identity() {
    let pipeline = TestPipeline::new();
    // templateId points at nothing.
    transcribed_recording(&pipeline, "r1", Some("nope")).await;

    assert_eq!(pipeline.trigger_summarization("r1").await, Disposition::Ack);

    assert_eq!(
        pipeline.summarizer.last_prompt().as_deref(),
        Some("hello world"),
        "identity template must pass the raw transcript through"
    );
    let meta = pipeline.metadata("r1").await;
    assert_eq!(meta.status, RecordingStatus::Complete);
}

#[tokio::test]
async fn absent_template_id_uses_identity() {
    let pipeline = TestPipeline::new();
    transcribed_recording(&pipeline, "r1", None).await;

    assert_eq!(pipeline.trigger_summarization("r1").await, Disposition::Ack);
    assert_eq!(
        pipeline.summarizer.last_prompt().as_deref(),
        Some("hello world")
    );
}

#[tokio::test]
async fn stale_event_without_transcript_is_a_noop() {
    let pipeline = TestPipeline::new();
    pipeline.seed_recording("r1", None).await;

    assert_eq!(pipeline.trigger_summarization("r1").await, Disposition::Ack);

    let meta = pipeline.metadata("r1").await;
    assert!(meta.summary.is_none());
    assert_eq!(meta.status, RecordingStatus::Queued);
    assert_eq!(pipeline.summarizer.calls(), 0);
}

#[tokio::test]
async fn event_for_unknown_recording_is_acked() {
    let pipeline = TestPipeline::new();
    assert_eq!(pipeline.trigger_summarization("ghost").await, Disposition::Ack);
    assert_eq!(pipeline.summarizer.calls(), 0);
}

#[tokio::test]
async fn duplicate_event_after_completion_is_a_noop() {
    let pipeline = TestPipeline::new();
    transcribed_recording(&pipeline, "r1", None).await;

    assert_eq!(pipeline.trigger_summarization("r1").await, Disposition::Ack);
    let first = pipeline.metadata("r1").await;
    assert_eq!(pipeline.trigger_summarization("r1").await, Disposition::Ack);
    let second = pipeline.metadata("r1").await;

    assert_eq!(pipeline.summarizer.calls(), 1);
    assert_eq!(first.summary, second.summary);
    assert_eq!(second.status, RecordingStatus::Complete);
    assert_eq!(first.updated_at, second.updated_at);
}

#[tokio::test]
async fn status_never_regresses_after_completion() {
    let pipeline = TestPipeline::new();
    transcribed_recording(&pipeline, "r1", None).await;
    assert_eq!(pipeline.trigger_summarization("r1").await, Disposition::Ack);

    // A late redelivery of the transcription trigger re-emits the event
    // but must not move the record backwards.
    assert_eq!(pipeline.trigger_transcription("r1").await, Disposition::Ack);
    let meta = pipeline.metadata("r1").await;
    assert_eq!(meta.status, RecordingStatus::Complete);
}

#[tokio::test]
async fn redelivered_event_after_failure_leaves_the_error_record_alone() {
    let pipeline = TestPipeline::with_engines(
        FakeTranscriber::ok("hello world"),
        FakeSummarizer::failing("llm unavailable"),
    );
    transcribed_recording(&pipeline, "r1", None).await;
    assert_eq!(pipeline.trigger_summarization("r1").await, Disposition::Ack);
    assert_eq!(pipeline.metadata("r1").await.status, RecordingStatus::Error);

    // At-least-once: the same event arrives again after the failure was
    // stored. The terminal record must not pick up a summary.
    assert_eq!(pipeline.trigger_summarization("r1").await, Disposition::Ack);

    let meta = pipeline.metadata("r1").await;
    assert_eq!(meta.status, RecordingStatus::Error);
    assert!(meta.summary.is_none());
    assert_eq!(pipeline.summarizer.calls(), 1);
}

#[tokio::test]
async fn engine_failure_marks_recording_failed() {
    let pipeline = TestPipeline::with_engines(
        FakeTranscriber::ok("hello world"),
        FakeSummarizer::failing("llm unavailable"),
    );
    transcribed_recording(&pipeline, "r1", None).await;

    assert_eq!(pipeline.trigger_summarization("r1").await, Disposition::Ack);

    let meta = pipeline.metadata("r1").await;
    assert_eq!(meta.status, RecordingStatus::Error);
    assert!(meta.error_message.unwrap().contains("llm unavailable"));
    // The transcript survives; only completion is off the table.
    assert_eq!(meta.transcript.as_deref(), Some("hello world"));
}
