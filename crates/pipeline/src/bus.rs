use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

pub type Headers = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus connection lost: {0}")]
    Disconnected(String),
    #[error("subscription closed")]
    Closed,
}

/// One message handed to a subscriber. At-least-once: the same payload may
/// arrive more than once, with `attempt` counting deliveries.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub subject: String,
    pub headers: Headers,
    pub payload: Vec<u8>,
    pub attempt: u32,
}

impl Delivery {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Publish/subscribe with queue-group load balancing. Implementations must
/// provide at-least-once delivery; ordering across publishers is not
/// guaranteed.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(
        &self,
        subject: &str,
        headers: Headers,
        payload: Vec<u8>,
    ) -> Result<(), BusError>;

    async fn subscribe(&self, subject: &str, queue_group: &str) -> Result<Subscription, BusError>;
}

/// Channel-backed subscription. `next` yields deliveries; the cloneable
/// [`Acker`] settles them from handler tasks.
pub struct Subscription {
    rx: mpsc::Receiver<Delivery>,
    acker: Acker,
}

impl Subscription {
    pub async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    pub fn acker(&self) -> Acker {
        self.acker.clone()
    }
}

/// Settles deliveries: `ack` drops the message, `nak` schedules a delayed
/// redelivery on the same subscription, bounded by `max_deliver`.
#[derive(Clone)]
pub struct Acker {
    redeliver: mpsc::Sender<Delivery>,
    max_deliver: u32,
    delay: Duration,
}

impl Acker {
    pub fn ack(&self, delivery: Delivery) {
        debug!(subject = %delivery.subject, attempt = delivery.attempt, "acked");
    }

    pub fn nak(&self, mut delivery: Delivery) {
        if delivery.attempt >= self.max_deliver {
            error!(
                subject = %delivery.subject,
                attempt = delivery.attempt,
                "delivery attempts exhausted, dropping message"
            );
            return;
        }
        delivery.attempt += 1;
        let tx = self.redeliver.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(delivery).await.is_err() {
                warn!("subscription gone, redelivery dropped");
            }
        });
    }
}

const SUBSCRIPTION_BUFFER: usize = 256;

struct Group {
    name: String,
    members: Vec<mpsc::Sender<Delivery>>,
    next: AtomicUsize,
}

impl Group {
    /// Round-robin pick of one member, skipping closed channels.
    fn pick(&self) -> Option<&mpsc::Sender<Delivery>> {
        for _ in 0..self.members.len() {
            let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.members.len();
            let member = &self.members[idx];
            if !member.is_closed() {
                return Some(member);
            }
        }
        None
    }
}

/// In-process bus with the external bus's semantics: every queue group on
/// a subject receives each message once, delivered to one member chosen
/// round-robin; nak triggers delayed redelivery.
pub struct MemoryBus {
    groups: DashMap<String, Vec<Arc<Group>>>,
    max_deliver: u32,
    redeliver_delay: Duration,
}

impl MemoryBus {
    pub fn new(max_deliver: u32, redeliver_delay: Duration) -> Self {
        Self {
            groups: DashMap::new(),
            max_deliver,
            redeliver_delay,
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(50, Duration::from_millis(10))
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(
        &self,
        subject: &str,
        headers: Headers,
        payload: Vec<u8>,
    ) -> Result<(), BusError> {
        let targets: Vec<Arc<Group>> = self
            .groups
            .get(subject)
            .map(|groups| groups.iter().map(Arc::clone).collect())
            .unwrap_or_default();

        if targets.is_empty() {
            debug!(%subject, "no subscribers, message dropped");
            return Ok(());
        }

        for group in targets {
            let delivery = Delivery {
                subject: subject.to_string(),
                headers: headers.clone(),
                payload: payload.clone(),
                attempt: 1,
            };
            match group.pick() {
                Some(member) => {
                    if member.send(delivery).await.is_err() {
                        warn!(%subject, group = %group.name, "subscriber channel closed");
                    }
                }
                None => warn!(%subject, group = %group.name, "queue group has no live members"),
            }
        }
        Ok(())
    }

    async fn subscribe(&self, subject: &str, queue_group: &str) -> Result<Subscription, BusError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let mut groups = self.groups.entry(subject.to_string()).or_default();
        match groups.iter().position(|g| g.name == queue_group) {
            Some(idx) => {
                // New member joins an existing group. Group internals are
                // behind an Arc, so rebuild the entry with the member added.
                let existing = &groups[idx];
                let mut members = existing.members.clone();
                members.push(tx.clone());
                groups[idx] = Arc::new(Group {
                    name: queue_group.to_string(),
                    members,
                    next: AtomicUsize::new(0),
                });
            }
            None => {
                groups.push(Arc::new(Group {
                    name: queue_group.to_string(),
                    members: vec![tx.clone()],
                    next: AtomicUsize::new(0),
                }));
            }
        }

        Ok(Subscription {
            rx,
            acker: Acker {
                redeliver: tx,
                max_deliver: self.max_deliver,
                delay: self.redeliver_delay,
            },
        })
    }
}
