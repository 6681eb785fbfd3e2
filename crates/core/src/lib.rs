pub mod access;
pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod escalation;
pub mod lease;
pub mod notification;
pub mod policy_source;
pub mod sla;
pub mod store;
pub mod tickets;

pub use chrono;

pub use clock::{ManualClock, SlaClock, SystemClock};
pub use domain::notification::{NotificationEvent, NotificationEventType};
pub use domain::policy::{EscalationRule, PolicyTables, SlaPolicy};
pub use domain::ticket::{Priority, Ticket, TicketId, TicketPatch, TicketStatus};
pub use domain::viewer::{Role, Viewer};
pub use engine::{EscalationEngine, EscalationEngineConfig, SweepReport};
pub use errors::{ApplicationError, DomainError, EngineIssue, InterfaceError};
pub use escalation::{EscalationRuleMatcher, EscalationThreshold};
pub use lease::{InMemorySweepLease, LeaseError, SweepLease};
pub use notification::{
    InMemoryNotificationPort, LoggingNotificationPort, NotificationError, NotificationPort,
};
pub use policy_source::{PolicySource, PolicySourceError, StaticPolicySource};
pub use sla::{AssignmentTrigger, SlaAssignment, SlaPolicyMatcher};
pub use store::{InMemoryTicketStore, StoreError, TicketStore, UpdateOutcome};
pub use tickets::{NewTicket, TicketService, TicketUpdate};
