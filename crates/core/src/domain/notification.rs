use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ticket::TicketId;

const EVENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f3c_2a1e_94d7_4b52_8e0a_c17d_5b39_e204);

/// Same ticket, kind and discriminator always yield the same id, so a redelivered or
/// replayed event can be dropped downstream.
fn event_id(ticket_id: &TicketId, kind: NotificationEventType, discriminator: &str) -> String {
    let name = format!("{}:{}:{}", ticket_id.0, kind.as_str(), discriminator);
    Uuid::new_v5(&EVENT_ID_NAMESPACE, name.as_bytes()).to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEventType {
    Breach,
    Escalate,
}

impl NotificationEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breach => "breach",
            Self::Escalate => "escalate",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub event_id: String,
    pub ticket_id: TicketId,
    pub event_type: NotificationEventType,
    pub level: Option<u32>,
    pub escalate_to: Option<String>,
    pub notify_users: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

impl NotificationEvent {
    /// One breach per deadline: a re-baselined ticket that breaches again gets a new id.
    pub fn breach(
        ticket_id: TicketId,
        sla_due_date: Option<DateTime<Utc>>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let deadline = sla_due_date.map_or_else(|| "none".to_string(), |due| due.to_rfc3339());
        Self {
            event_id: event_id(&ticket_id, NotificationEventType::Breach, &deadline),
            ticket_id,
            event_type: NotificationEventType::Breach,
            level: None,
            escalate_to: None,
            notify_users: Vec::new(),
            occurred_at,
        }
    }

    pub fn escalate(
        ticket_id: TicketId,
        level: u32,
        escalate_to: impl Into<String>,
        notify_users: Vec<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id(&ticket_id, NotificationEventType::Escalate, &level.to_string()),
            ticket_id,
            event_type: NotificationEventType::Escalate,
            level: Some(level),
            escalate_to: Some(escalate_to.into()),
            notify_users,
            occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::NotificationEvent;
    use crate::domain::ticket::TicketId;

    #[test]
    fn event_ids_are_stable_per_ticket_kind_and_level() {
        let t0 = Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).single().expect("valid time");
        let ticket = || TicketId("T-1".to_string());

        let first = NotificationEvent::escalate(ticket(), 2, "L2-Duty", vec![], t0);
        let replay =
            NotificationEvent::escalate(ticket(), 2, "L2-Duty", vec![], t0 + Duration::minutes(5));
        let next_level = NotificationEvent::escalate(ticket(), 3, "L2-Duty", vec![], t0);
        let other_ticket =
            NotificationEvent::escalate(TicketId("T-2".to_string()), 2, "L2-Duty", vec![], t0);

        assert_eq!(first.event_id, replay.event_id);
        assert_ne!(first.event_id, next_level.event_id);
        assert_ne!(first.event_id, other_ticket.event_id);
    }

    #[test]
    fn breach_id_changes_with_the_deadline() {
        let t0 = Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).single().expect("valid time");
        let ticket = || TicketId("T-1".to_string());
        let due = Some(t0 + Duration::minutes(240));

        let breach = NotificationEvent::breach(ticket(), due, t0);
        let again = NotificationEvent::breach(ticket(), due, t0 + Duration::minutes(1));
        let rebaselined =
            NotificationEvent::breach(ticket(), Some(t0 + Duration::minutes(480)), t0);
        let escalate = NotificationEvent::escalate(ticket(), 1, "L1", vec![], t0);

        assert_eq!(breach.event_id, again.event_id);
        assert_ne!(breach.event_id, rebaselined.event_id);
        assert_ne!(breach.event_id, escalate.event_id);
    }
}
