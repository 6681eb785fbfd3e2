//! Resolution deadline assignment.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::policy::{PolicyTables, MAX_RESOLUTION_MINUTES};
use crate::domain::ticket::Ticket;
use crate::errors::EngineIssue;

/// Why a deadline is being (re)assigned. Determines the reference time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignmentTrigger {
    /// First assignment: measured from `ticket.created_at`.
    Creation,
    /// Priority or category changed: re-baselined from `now`, not added to the old deadline.
    Reclassified,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaAssignment {
    pub sla_id: String,
    pub sla_due_date: DateTime<Utc>,
    pub used_default: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SlaPolicyMatcher;

impl SlaPolicyMatcher {
    pub fn assign(
        &self,
        ticket: &Ticket,
        tables: &PolicyTables,
        trigger: AssignmentTrigger,
        now: DateTime<Utc>,
    ) -> (SlaAssignment, Option<EngineIssue>) {
        let (policy, mut issue) = match tables.sla_policies.get(&ticket.priority) {
            Some(policy) => (policy, None),
            None => {
                warn!(
                    event_name = "engine.policy.fallback",
                    ticket_id = %ticket.id,
                    priority = ticket.priority.as_str(),
                    default_sla_id = %tables.default_sla.id,
                    "no sla policy for priority; applying default policy"
                );
                (
                    &tables.default_sla,
                    Some(EngineIssue::MissingSlaPolicy { priority: ticket.priority }),
                )
            }
        };

        let reference_time = match trigger {
            AssignmentTrigger::Creation => ticket.created_at,
            AssignmentTrigger::Reclassified => now,
        };

        let used_default = issue.is_some();
        let minutes = policy.resolution_minutes.clamp(1, MAX_RESOLUTION_MINUTES);
        if minutes != policy.resolution_minutes {
            warn!(
                event_name = "engine.policy.deadline_clamped",
                ticket_id = %ticket.id,
                sla_id = %policy.id,
                resolution_minutes = policy.resolution_minutes,
                clamped_minutes = minutes,
                "sla resolution window out of range; clamping"
            );
            issue = Some(EngineIssue::SlaDeadlineOutOfRange {
                sla_id: policy.id.clone(),
                resolution_minutes: policy.resolution_minutes,
            });
        }

        let sla_due_date = Duration::try_minutes(minutes)
            .and_then(|window| reference_time.checked_add_signed(window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let assignment = SlaAssignment { sla_id: policy.id.clone(), sla_due_date, used_default };

        (assignment, issue)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{AssignmentTrigger, SlaPolicyMatcher};
    use crate::domain::policy::{PolicyTables, SlaPolicy, MAX_RESOLUTION_MINUTES};
    use crate::domain::ticket::{Priority, Ticket, TicketId, TicketStatus};
    use crate::errors::EngineIssue;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).single().expect("valid time")
    }

    fn tables() -> PolicyTables {
        PolicyTables::new(SlaPolicy {
            id: "sla-default".to_string(),
            priority: Priority::Medium,
            response_minutes: 60,
            resolution_minutes: 1440,
        })
        .with_sla_policy(SlaPolicy {
            id: "sla-urgent".to_string(),
            priority: Priority::Urgent,
            response_minutes: 30,
            resolution_minutes: 240,
        })
    }

    fn ticket(priority: Priority) -> Ticket {
        Ticket {
            id: TicketId("TCK-7".to_string()),
            title: "VPN down".to_string(),
            status: TicketStatus::Open,
            priority,
            category: None,
            zone: "North".to_string(),
            branch: "HQ".to_string(),
            assigned_to: None,
            created_by: "Dana".to_string(),
            created_at: t0(),
            updated_at: t0(),
            sla_id: None,
            sla_due_date: None,
            escalation_level: 0,
            escalated_to: None,
            breached_sla: false,
            version: 1,
        }
    }

    #[test]
    fn urgent_ticket_is_due_four_hours_after_creation() {
        let (assignment, issue) = SlaPolicyMatcher.assign(
            &ticket(Priority::Urgent),
            &tables(),
            AssignmentTrigger::Creation,
            t0() + Duration::minutes(5),
        );

        assert_eq!(assignment.sla_id, "sla-urgent");
        assert_eq!(assignment.sla_due_date, t0() + Duration::minutes(240));
        assert!(issue.is_none());
    }

    #[test]
    fn reclassification_rebaselines_from_now() {
        let now = t0() + Duration::minutes(90);
        let (assignment, _) = SlaPolicyMatcher.assign(
            &ticket(Priority::Urgent),
            &tables(),
            AssignmentTrigger::Reclassified,
            now,
        );

        assert_eq!(assignment.sla_due_date, now + Duration::minutes(240));
    }

    #[test]
    fn missing_policy_falls_back_with_issue() {
        let (assignment, issue) = SlaPolicyMatcher.assign(
            &ticket(Priority::Low),
            &tables(),
            AssignmentTrigger::Creation,
            t0(),
        );

        assert_eq!(assignment.sla_id, "sla-default");
        assert_eq!(assignment.sla_due_date, t0() + Duration::minutes(1440));
        assert!(assignment.used_default);
        assert_eq!(issue, Some(EngineIssue::MissingSlaPolicy { priority: Priority::Low }));
    }

    #[test]
    fn oversized_resolution_window_is_clamped_not_overflowed() {
        let tables = PolicyTables::new(SlaPolicy {
            id: "sla-forever".to_string(),
            priority: Priority::Medium,
            response_minutes: 60,
            resolution_minutes: 200_000_000_000,
        });

        let (assignment, issue) = SlaPolicyMatcher.assign(
            &ticket(Priority::Medium),
            &tables,
            AssignmentTrigger::Creation,
            t0(),
        );

        assert_eq!(assignment.sla_due_date, t0() + Duration::minutes(MAX_RESOLUTION_MINUTES));
        assert!(assignment.used_default);
        assert_eq!(
            issue,
            Some(EngineIssue::SlaDeadlineOutOfRange {
                sla_id: "sla-forever".to_string(),
                resolution_minutes: 200_000_000_000,
            })
        );
    }

    #[test]
    fn non_positive_resolution_window_is_clamped_to_one_minute() {
        let tables = tables().with_sla_policy(SlaPolicy {
            id: "sla-broken".to_string(),
            priority: Priority::High,
            response_minutes: 0,
            resolution_minutes: -5,
        });

        let (assignment, issue) = SlaPolicyMatcher.assign(
            &ticket(Priority::High),
            &tables,
            AssignmentTrigger::Creation,
            t0(),
        );

        assert_eq!(assignment.sla_due_date, t0() + Duration::minutes(1));
        assert!(!assignment.used_default);
        assert!(matches!(issue, Some(EngineIssue::SlaDeadlineOutOfRange { .. })));
    }
}
