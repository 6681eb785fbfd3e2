use serde::Serialize;
use thiserror::Error;

use crate::domain::ticket::{Priority, TicketId, TicketStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid ticket transition from {from:?} to {to:?}")]
    InvalidStatusTransition { from: TicketStatus, to: TicketStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("ticket not found: {0}")]
    NotFound(TicketId),
    #[error("ticket {0} was modified concurrently; retries exhausted")]
    Conflict(TicketId),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested ticket does not exist or is not visible.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(DomainError::InvalidStatusTransition { .. })
            | ApplicationError::Domain(DomainError::InvariantViolation(_)) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::NotFound(id) => Self::NotFound {
                message: format!("ticket {id} not found"),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Conflict(id) => Self::ServiceUnavailable {
                message: format!("ticket {id} is busy"),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

/// Internal engine conditions. These are logged and reported on the sweep report, never
/// surfaced to a viewer as a failed ticket operation.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineIssue {
    #[error("no sla policy for priority {priority:?}; default policy applied")]
    MissingSlaPolicy { priority: Priority },
    #[error("no escalation rule for priority {priority:?}; ticket will not auto-escalate")]
    MissingEscalationRule { priority: Priority },
    #[error("sla policy {sla_id} resolution of {resolution_minutes} minutes is out of range; clamped")]
    SlaDeadlineOutOfRange { sla_id: String, resolution_minutes: i64 },
    #[error("escalation rule for priority {priority:?} is invalid: {message}")]
    InvalidEscalationRule { priority: Priority, message: String },
    #[error("policy tables could not be refreshed: {message}")]
    PolicyRefresh { message: String },
    #[error("ticket {ticket_id} changed since read (expected version {expected_version})")]
    ConcurrencyConflict { ticket_id: TicketId, expected_version: u64 },
    #[error("notification delivery failed for ticket {ticket_id}: {message}")]
    NotificationDelivery { ticket_id: TicketId, message: String },
    #[error("sweep skipped: previous sweep still running")]
    SchedulerOverrun,
    #[error("store failure for ticket {ticket_id}: {message}")]
    Store { ticket_id: TicketId, message: String },
}
