use std::time::Duration;

use crate::fixtures::engines::{FakeSummarizer, FakeTranscriber};
use crate::fixtures::test_pipeline::TestPipeline;
use precepto_model::{RecordingStatus, subjects};
use precepto_pipeline::stages::Disposition;

async fn ingest_complete_recording(pipeline: &TestPipeline, id: &str) {
    pipeline.ingest_chunk(id, 0, false, b"a").await;
    pipeline.ingest_chunk(id, 1, false, b"b").await;
    pipeline.ingest_chunk(id, 2, true, b"c").await;
}

#[tokio::test]
async fn gap_in_chunk_index_aborts_without_mutating_metadata() {
    let pipeline = TestPipeline::new();
    pipeline.seed_recording("r1", None).await;

    pipeline.ingest_chunk("r1", 0, false, b"a").await;
    pipeline.ingest_chunk("r1", 2, true, b"c").await;
    let before = pipeline.metadata("r1").await;

    assert_eq!(pipeline.trigger_transcription("r1").await, Disposition::Retry);

    let after = pipeline.metadata("r1").await;
    assert_eq!(after.status, before.status);
    assert!(after.transcript.is_none());
    assert_eq!(pipeline.transcriber.calls(), 0);
}

#[tokio::test]
async fn missing_terminal_marker_aborts() {
    let pipeline = TestPipeline::new();
    pipeline.seed_recording("r1", None).await;

    pipeline.ingest_chunk("r1", 0, false, b"a").await;
    pipeline.ingest_chunk("r1", 1, false, b"b").await;

    assert_eq!(pipeline.trigger_transcription("r1").await, Disposition::Retry);
    assert_eq!(pipeline.transcriber.calls(), 0);
}

#[tokio::test]
async fn concatenation_is_ordered_by_sequence_not_arrival() {
    for order in [[2u64, 0, 1], [1, 2, 0], [0, 1, 2]] {
        let pipeline = TestPipeline::new();
        pipeline.seed_recording("r1", None).await;

        let payloads: [(u64, &[u8]); 3] = [(0, b"a"), (1, b"b"), (2, b"c")];
        for seq in order {
            let (_, payload) = payloads[seq as usize];
            pipeline.ingest_chunk("r1", seq, seq == 2, payload).await;
        }

        assert_eq!(pipeline.trigger_transcription("r1").await, Disposition::Ack);
        assert_eq!(
            pipeline.transcriber.last_audio().unwrap(),
            b"abc".to_vec(),
            "arrival order {order:?} must not affect assembly"
        );
    }
}

#[tokio::test]
async fn successful_transcription_stores_transcript_and_emits_event() {
    let pipeline = TestPipeline::new();
    pipeline.seed_recording("r1", None).await;
    ingest_complete_recording(&pipeline, "r1").await;

    let mut probe = pipeline.probe(subjects::TRANSCRIPTION_COMPLETED).await;
    assert_eq!(pipeline.trigger_transcription("r1").await, Disposition::Ack);

    let meta = pipeline.metadata("r1").await;
    assert_eq!(meta.transcript.as_deref(), Some("hello world"));
    assert_eq!(meta.status, RecordingStatus::Incomplete);
    assert_eq!(meta.backend_stage.as_deref(), Some("transcription"));
    assert!(meta.error_message.is_none());

    let event = tokio::time::timeout(Duration::from_millis(100), probe.next())
        .await
        .expect("transcription.completed not emitted")
        .unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&event.payload).unwrap();
    assert_eq!(payload["recordingId"], "r1");
}

#[tokio::test]
async fn duplicate_trigger_reemits_event_without_rerunning_inference() {
    let pipeline = TestPipeline::new();
    pipeline.seed_recording("r1", None).await;
    ingest_complete_recording(&pipeline, "r1").await;

    let mut probe = pipeline.probe(subjects::TRANSCRIPTION_COMPLETED).await;
    assert_eq!(pipeline.trigger_transcription("r1").await, Disposition::Ack);
    assert_eq!(pipeline.trigger_transcription("r1").await, Disposition::Ack);

    assert_eq!(pipeline.transcriber.calls(), 1);

    // Both triggers produced an event; consumers tolerate duplicates.
    for _ in 0..2 {
        tokio::time::timeout(Duration::from_millis(100), probe.next())
            .await
            .expect("expected a completion event")
            .unwrap();
    }
}

#[tokio::test]
async fn engine_failure_is_a_stored_terminal_outcome() {
    let pipeline =
        TestPipeline::with_engines(FakeTranscriber::failing("model exploded"), FakeSummarizer::echo());
    pipeline.seed_recording("r1", None).await;
    ingest_complete_recording(&pipeline, "r1").await;

    let mut probe = pipeline.probe(subjects::TRANSCRIPTION_COMPLETED).await;
    // Acked: a stored error is a valid outcome, not an infrastructure
    // failure needing redelivery.
    assert_eq!(pipeline.trigger_transcription("r1").await, Disposition::Ack);

    let meta = pipeline.metadata("r1").await;
    assert_eq!(meta.status, RecordingStatus::Error);
    assert!(meta.error_message.unwrap().contains("model exploded"));
    assert!(meta.transcript.is_none());

    assert!(
        tokio::time::timeout(Duration::from_millis(50), probe.next())
            .await
            .is_err(),
        "no completion event may be emitted on engine failure"
    );
}

#[tokio::test]
async fn redelivered_trigger_after_failure_does_not_rerun_inference() {
    let pipeline = TestPipeline::with_engines(
        FakeTranscriber::failing("model exploded"),
        FakeSummarizer::echo(),
    );
    pipeline.seed_recording("r1", None).await;
    ingest_complete_recording(&pipeline, "r1").await;

    assert_eq!(pipeline.trigger_transcription("r1").await, Disposition::Ack);
    // Redelivery of the trigger after the failure was stored.
    assert_eq!(pipeline.trigger_transcription("r1").await, Disposition::Ack);

    assert_eq!(pipeline.transcriber.calls(), 1);
    let meta = pipeline.metadata("r1").await;
    assert_eq!(meta.status, RecordingStatus::Error);
    assert!(meta.transcript.is_none());
}

#[tokio::test]
async fn engine_timeout_is_treated_as_failure() {
    let pipeline = TestPipeline::with_engines(FakeTranscriber::timing_out(), FakeSummarizer::echo());
    pipeline.seed_recording("r2", None).await;
    pipeline.ingest_chunk("r2", 0, true, b"audio").await;

    assert_eq!(pipeline.trigger_transcription("r2").await, Disposition::Ack);

    let meta = pipeline.metadata("r2").await;
    assert_eq!(meta.status, RecordingStatus::Error);
    assert!(!meta.error_message.unwrap().is_empty());
}
