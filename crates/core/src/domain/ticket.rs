use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketId(pub String);

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Resolved and closed tickets no longer take part in breach or escalation evaluation.
    pub fn is_escalation_inert(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub title: String,
    pub status: TicketStatus,
    pub priority: Priority,
    pub category: Option<String>,
    pub zone: String,
    pub branch: String,
    pub assigned_to: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sla_id: Option<String>,
    pub sla_due_date: Option<DateTime<Utc>>,
    pub escalation_level: u32,
    pub escalated_to: Option<String>,
    pub breached_sla: bool,
    /// Optimistic-concurrency token. Bumped by the store on every applied patch.
    #[serde(skip_serializing)]
    #[serde(default)]
    pub version: u64,
}

impl Ticket {
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        matches!(
            (self.status, next),
            (TicketStatus::Open, TicketStatus::InProgress)
                | (TicketStatus::InProgress, TicketStatus::Open)
                | (TicketStatus::Open, TicketStatus::Resolved)
                | (TicketStatus::Open, TicketStatus::Closed)
                | (TicketStatus::InProgress, TicketStatus::Resolved)
                | (TicketStatus::InProgress, TicketStatus::Closed)
                | (TicketStatus::Resolved, TicketStatus::Closed)
        ) || self.status == next
    }

    pub fn ensure_transition(&self, next: TicketStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            return Ok(());
        }

        Err(DomainError::InvalidStatusTransition { from: self.status, to: next })
    }

    /// Breach as observed at `now`: past the deadline while still open.
    pub fn is_breached_at(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_escalation_inert() && self.sla_due_date.is_some_and(|due| now > due)
    }
}

/// Field-level changes applied by a conditional store write.
///
/// `None` leaves the stored field untouched. Double options clear a field when the
/// inner value is `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TicketPatch {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub category: Option<Option<String>>,
    pub zone: Option<String>,
    pub branch: Option<String>,
    pub assigned_to: Option<Option<String>>,
    pub sla_id: Option<String>,
    pub sla_due_date: Option<DateTime<Utc>>,
    pub escalation_level: Option<u32>,
    pub escalated_to: Option<String>,
    pub breached_sla: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TicketPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.priority.is_none()
            && self.category.is_none()
            && self.zone.is_none()
            && self.branch.is_none()
            && self.assigned_to.is_none()
            && self.sla_id.is_none()
            && self.sla_due_date.is_none()
            && self.escalation_level.is_none()
            && self.escalated_to.is_none()
            && self.breached_sla.is_none()
    }

    /// Applies the patch and bumps the version. Stores call this once the expected
    /// version has been checked.
    pub fn apply_to(&self, ticket: &mut Ticket) {
        if let Some(status) = self.status {
            ticket.status = status;
        }
        if let Some(priority) = self.priority {
            ticket.priority = priority;
        }
        if let Some(category) = &self.category {
            ticket.category = category.clone();
        }
        if let Some(zone) = &self.zone {
            ticket.zone = zone.clone();
        }
        if let Some(branch) = &self.branch {
            ticket.branch = branch.clone();
        }
        if let Some(assigned_to) = &self.assigned_to {
            ticket.assigned_to = assigned_to.clone();
        }
        if let Some(sla_id) = &self.sla_id {
            ticket.sla_id = Some(sla_id.clone());
        }
        if let Some(sla_due_date) = self.sla_due_date {
            ticket.sla_due_date = Some(sla_due_date);
        }
        if let Some(level) = self.escalation_level {
            ticket.escalation_level = ticket.escalation_level.max(level);
        }
        if let Some(escalated_to) = &self.escalated_to {
            ticket.escalated_to = Some(escalated_to.clone());
        }
        if let Some(breached) = self.breached_sla {
            ticket.breached_sla = breached;
        }
        if let Some(updated_at) = self.updated_at {
            ticket.updated_at = updated_at;
        }
        ticket.version += 1;
    }
}
