use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::domain::notification::NotificationEvent;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notification rejected: {0}")]
    Rejected(String),
    #[error("notification transport unavailable: {0}")]
    Unavailable(String),
}

/// Receiver of breach and escalation events. Delivery transport lives behind this trait.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotificationError>;
}

/// Records delivered events in order. Can be primed to reject the next deliveries.
#[derive(Clone, Default)]
pub struct InMemoryNotificationPort {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
    pending_failures: Arc<Mutex<u32>>,
}

impl InMemoryNotificationPort {
    pub fn events(&self) -> Vec<NotificationEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn fail_next(&self, count: u32) {
        match self.pending_failures.lock() {
            Ok(mut pending) => *pending = count,
            Err(poisoned) => *poisoned.into_inner() = count,
        }
    }

    fn take_failure(&self) -> bool {
        let mut pending = match self.pending_failures.lock() {
            Ok(pending) => pending,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *pending == 0 {
            return false;
        }
        *pending -= 1;
        true
    }
}

#[async_trait]
impl NotificationPort for InMemoryNotificationPort {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        if self.take_failure() {
            return Err(NotificationError::Unavailable("primed failure".to_string()));
        }

        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
        Ok(())
    }
}

/// Emits one structured log line per event. Used when no transport is wired.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingNotificationPort;

#[async_trait]
impl NotificationPort for LoggingNotificationPort {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        info!(
            event_name = "notification.delivered",
            event_id = %event.event_id,
            ticket_id = %event.ticket_id,
            event_type = event.event_type.as_str(),
            escalation_level = event.level,
            escalate_to = event.escalate_to.as_deref().unwrap_or("none"),
            notify_users = %event.notify_users.join(","),
            occurred_at = %event.occurred_at.to_rfc3339(),
            "notification event"
        );
        Ok(())
    }
}
