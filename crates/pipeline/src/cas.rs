use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::PipelineError;
use crate::kv::{KvBucket, KvError};

/// Read-mutate-conditional-write loop: reads the record at `key`, applies
/// the pure `mutate` function, and writes back with the revision it read.
/// On a revision conflict it re-reads and reapplies, up to `max_attempts`,
/// then fails with [`PipelineError::ConflictExhausted`].
///
/// Every stage's metadata mutation goes through here; no stage performs
/// an unconditional put.
pub async fn update_with_retry<T, F>(
    bucket: &dyn KvBucket,
    key: &str,
    max_attempts: u32,
    mutate: F,
) -> Result<T, PipelineError>
where
    T: Serialize + DeserializeOwned,
    F: Fn(T) -> T,
{
    for attempt in 1..=max_attempts {
        let entry = bucket
            .get(key)
            .await?
            .ok_or_else(|| PipelineError::RecordNotFound(key.to_string()))?;
        let current: T = serde_json::from_slice(&entry.value)?;
        let updated = mutate(current);
        let encoded = serde_json::to_vec(&updated)?;

        match bucket.update(key, encoded, entry.revision).await {
            Ok(_) => return Ok(updated),
            Err(KvError::WrongRevision { current, .. }) => {
                debug!(%key, attempt, stale = entry.revision, current, "revision conflict, re-reading");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(PipelineError::ConflictExhausted {
        key: key.to_string(),
        attempts: max_attempts,
    })
}
