use std::sync::Arc;

use crate::fixtures::test_pipeline::TestPipeline;
use precepto_model::{RecordingMetadata, RecordingStatus};
use precepto_pipeline::kv::KvBucket;
use precepto_pipeline::update_with_retry;

#[tokio::test]
async fn concurrent_writers_both_land() {
    let pipeline = TestPipeline::new();
    pipeline.seed_recording("r1", None).await;
    let bucket = Arc::clone(&pipeline.recordings);

    // Two stages racing on the same record, mutating different fields.
    // Each must end up applied on top of the other's write.
    let transcript_writer = {
        let bucket = Arc::clone(&bucket);
        tokio::spawn(async move {
            update_with_retry(bucket.as_ref(), "r1", 5, |mut meta: RecordingMetadata| {
                meta.transcript = Some("hello world".to_string());
                meta.advance(RecordingStatus::Incomplete);
                meta
            })
            .await
        })
    };
    let summary_writer = {
        let bucket = Arc::clone(&bucket);
        tokio::spawn(async move {
            update_with_retry(bucket.as_ref(), "r1", 5, |mut meta: RecordingMetadata| {
                meta.summary = Some("hi".to_string());
                meta
            })
            .await
        })
    };

    transcript_writer.await.unwrap().unwrap();
    summary_writer.await.unwrap().unwrap();

    let meta = pipeline.metadata("r1").await;
    assert_eq!(meta.transcript.as_deref(), Some("hello world"));
    assert_eq!(meta.summary.as_deref(), Some("hi"));
    assert_eq!(meta.status, RecordingStatus::Incomplete);
}

#[tokio::test]
async fn many_concurrent_increments_are_never_lost() {
    let pipeline = TestPipeline::new();
    let bucket = Arc::clone(&pipeline.recordings);
    bucket
        .put("counter", serde_json::to_vec(&0u64).unwrap())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let bucket = Arc::clone(&bucket);
        handles.push(tokio::spawn(async move {
            update_with_retry(bucket.as_ref(), "counter", 64, |n: u64| n + 1).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let entry = bucket.get("counter").await.unwrap().unwrap();
    let value: u64 = serde_json::from_slice(&entry.value).unwrap();
    assert_eq!(value, 8, "every CAS write must merge onto the latest state");
}
