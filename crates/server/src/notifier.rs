use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use supportdesk_core::config::NotificationConfig;
use supportdesk_core::domain::notification::NotificationEvent;
use supportdesk_core::notification::{NotificationError, NotificationPort};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

pub const DELIVERY_QUEUE_CAPACITY: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &NotificationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.backoff_multiplier.max(1),
        }
    }

    /// Wait before retry number `attempt` (1-based): `base * multiplier^(attempt - 1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Retries transient delivery failures with exponential backoff.
///
/// Rejections are returned immediately. The engine never waits on the outcome to
/// decide escalation state, so exhausting retries only costs the notification.
pub struct RetryingNotifier {
    inner: Arc<dyn NotificationPort>,
    policy: RetryPolicy,
}

impl RetryingNotifier {
    pub fn new(inner: Arc<dyn NotificationPort>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl NotificationPort for RetryingNotifier {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        let mut attempt = 1;
        loop {
            match self.inner.deliver(event).await {
                Ok(()) => return Ok(()),
                Err(NotificationError::Rejected(reason)) => {
                    return Err(NotificationError::Rejected(reason));
                }
                Err(error) if attempt >= self.policy.max_attempts => {
                    error!(
                        event_name = "notification.retries_exhausted",
                        event_id = %event.event_id,
                        ticket_id = %event.ticket_id,
                        attempts = attempt,
                        error = %error,
                        "giving up on notification delivery"
                    );
                    return Err(error);
                }
                Err(error) => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        event_name = "notification.retry_scheduled",
                        event_id = %event.event_id,
                        ticket_id = %event.ticket_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "notification delivery failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Enqueues events for a background [`DeliveryWorker`] so the sweep never waits on
/// transport retries. `deliver` fails only when the queue is full or the worker is gone.
#[derive(Clone)]
pub struct QueuedNotifier {
    sender: mpsc::Sender<NotificationEvent>,
}

pub struct DeliveryWorker {
    receiver: mpsc::Receiver<NotificationEvent>,
    inner: Arc<dyn NotificationPort>,
}

impl QueuedNotifier {
    pub fn channel(inner: Arc<dyn NotificationPort>, capacity: usize) -> (Self, DeliveryWorker) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, DeliveryWorker { receiver, inner })
    }
}

#[async_trait]
impl NotificationPort for QueuedNotifier {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        match self.sender.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                Err(NotificationError::Unavailable("delivery queue is full".to_string()))
            }
            Err(TrySendError::Closed(_)) => {
                Err(NotificationError::Unavailable("delivery worker has stopped".to_string()))
            }
        }
    }
}

impl DeliveryWorker {
    /// Delivers queued events in order until every [`QueuedNotifier`] is dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.receiver.recv().await {
            match self.inner.deliver(&event).await {
                Ok(()) => debug!(
                    event_name = "notification.delivered",
                    event_id = %event.event_id,
                    ticket_id = %event.ticket_id,
                    "queued notification delivered"
                ),
                Err(delivery_error) => error!(
                    event_name = "notification.dropped",
                    event_id = %event.event_id,
                    ticket_id = %event.ticket_id,
                    event_type = event.event_type.as_str(),
                    error = %delivery_error,
                    "queued notification could not be delivered"
                ),
            }
        }
    }
}
