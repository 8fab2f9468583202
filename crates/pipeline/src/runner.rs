use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::info;

use crate::bus::MessageBus;
use crate::error::PipelineError;
use crate::stages::{Disposition, Stage};

/// Subscribes a stage and dispatches deliveries to spawned handler tasks.
/// The dispatch loop never awaits a handler: a long inference call cannot
/// stall delivery of unrelated messages. In-flight handlers are capped by
/// a semaphore.
pub struct StageRunner {
    bus: Arc<dyn MessageBus>,
    queue_group: String,
    max_in_flight: usize,
}

impl StageRunner {
    pub fn new(bus: Arc<dyn MessageBus>, queue_group: impl Into<String>, max_in_flight: usize) -> Self {
        Self {
            bus,
            queue_group: queue_group.into(),
            max_in_flight,
        }
    }

    /// Establishes the subscription, then spawns the dispatch loop and
    /// returns its handle. The subscription exists before this returns,
    /// so a message published right after `start` cannot miss the queue
    /// group. Instances of the same stage share a queue group, so the
    /// bus load-balances across them.
    pub async fn start(&self, stage: Arc<dyn Stage>) -> Result<JoinHandle<()>, PipelineError> {
        let queue = format!("{}-{}", self.queue_group, stage.name());
        let mut subscription = self.bus.subscribe(stage.subject(), &queue).await?;
        let acker = subscription.acker();
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));

        info!(
            stage = stage.name(),
            subject = stage.subject(),
            %queue,
            max_in_flight = self.max_in_flight,
            "stage running"
        );

        Ok(tokio::spawn(async move {
            while let Some(delivery) = subscription.next().await {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let stage = Arc::clone(&stage);
                let acker = acker.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    match stage.handle(&delivery).await {
                        Disposition::Ack => acker.ack(delivery),
                        Disposition::Retry => acker.nak(delivery),
                    }
                });
            }
            info!(stage = stage.name(), "subscription closed, stage stopping");
        }))
    }
}
