//! Ticket visibility rules.
//!
//! Every read path filters through [`scope`] once. The decision depends only on the
//! viewer's role, zone and name and the ticket's zone, assignee and creator.

use crate::domain::ticket::Ticket;
use crate::domain::viewer::{Role, Viewer};

/// Returns `true` when `viewer` may see `ticket`.
pub fn can_view(viewer: &Viewer, ticket: &Ticket) -> bool {
    match &viewer.role {
        Role::Admin => true,
        Role::Customer => {
            ticket.created_by == viewer.name
                || viewer
                    .customer_identity
                    .as_deref()
                    .is_some_and(|identity| ticket.created_by == identity)
        }
        Role::Manager => ticket.zone == viewer.zone,
        Role::Agent => {
            ticket.zone == viewer.zone || ticket.assigned_to.as_deref() == Some(&viewer.name)
        }
        Role::Other(_) => false,
    }
}

/// Visible subset of `tickets`, in input order.
pub fn scope(viewer: &Viewer, tickets: Vec<Ticket>) -> Vec<Ticket> {
    tickets.into_iter().filter(|ticket| can_view(viewer, ticket)).collect()
}

/// Borrowing variant of [`scope`] for callers that keep the snapshot.
pub fn scope_ref<'a>(viewer: &Viewer, tickets: &'a [Ticket]) -> Vec<&'a Ticket> {
    tickets.iter().filter(|ticket| can_view(viewer, ticket)).collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{can_view, scope, scope_ref};
    use crate::domain::ticket::{Priority, Ticket, TicketId, TicketStatus};
    use crate::domain::viewer::{Role, Viewer};

    fn ticket(id: &str, zone: &str, assigned_to: Option<&str>, created_by: &str) -> Ticket {
        let created_at = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).single().expect("valid time");
        Ticket {
            id: TicketId(id.to_string()),
            title: format!("ticket {id}"),
            status: TicketStatus::Open,
            priority: Priority::Medium,
            category: None,
            zone: zone.to_string(),
            branch: "main".to_string(),
            assigned_to: assigned_to.map(str::to_string),
            created_by: created_by.to_string(),
            created_at,
            updated_at: created_at,
            sla_id: None,
            sla_due_date: None,
            escalation_level: 0,
            escalated_to: None,
            breached_sla: false,
            version: 1,
        }
    }

    fn ids(tickets: &[Ticket]) -> Vec<&str> {
        tickets.iter().map(|ticket| ticket.id.0.as_str()).collect()
    }

    fn fixture() -> Vec<Ticket> {
        vec![
            ticket("A", "North", Some("Asha"), "Carmen"),
            ticket("B", "North", Some("Other"), "Luis"),
            ticket("C", "South", None, "Carmen"),
            ticket("D", "East", Some("Bo"), "acme-corp"),
        ]
    }

    #[test]
    fn agent_sees_home_zone_and_own_assignments() {
        let asha = Viewer::new("u-1", Role::Agent, "South", "Asha");
        let tickets = vec![
            ticket("X", "North", Some("Asha"), "Carmen"),
            ticket("Y", "North", Some("Other"), "Carmen"),
        ];

        assert_eq!(ids(&scope(&asha, tickets)), vec!["X"]);
        assert_eq!(ids(&scope(&asha, fixture())), vec!["A", "C"]);
    }

    #[test]
    fn admin_sees_everything() {
        let admin = Viewer::new("u-0", Role::Admin, "Nowhere", "root");
        assert_eq!(scope(&admin, fixture()).len(), 4);
    }

    #[test]
    fn manager_is_limited_to_zone() {
        let manager = Viewer::new("u-2", Role::Manager, "North", "Asha");
        assert_eq!(ids(&scope(&manager, fixture())), vec!["A", "B"]);
    }

    #[test]
    fn customer_matches_name_or_external_identity() {
        let carmen = Viewer::new("u-3", Role::Customer, "North", "Carmen");
        assert_eq!(ids(&scope(&carmen, fixture())), vec!["A", "C"]);

        let acme = Viewer::new("u-4", Role::Customer, "East", "Jo").with_customer_identity("acme-corp");
        assert_eq!(ids(&scope(&acme, fixture())), vec!["D"]);
    }

    #[test]
    fn unknown_role_fails_closed() {
        let auditor = Viewer::new("u-5", Role::Other("auditor".to_string()), "North", "Asha");
        assert!(scope(&auditor, fixture()).is_empty());
    }

    #[test]
    fn scope_is_sound_and_complete_for_every_viewer() {
        let viewers = [
            Viewer::new("a", Role::Admin, "North", "Asha"),
            Viewer::new("m", Role::Manager, "South", "Asha"),
            Viewer::new("g", Role::Agent, "East", "Asha"),
            Viewer::new("c", Role::Customer, "North", "Carmen"),
            Viewer::new("o", Role::parse("guest"), "North", "Carmen"),
        ];
        let tickets = fixture();

        for viewer in &viewers {
            let visible = scope_ref(viewer, &tickets);
            for ticket in &tickets {
                let included = visible.iter().any(|candidate| candidate.id == ticket.id);
                assert_eq!(included, can_view(viewer, ticket), "viewer {:?}", viewer.role);
            }
            assert!(visible.len() <= tickets.len());
        }
    }
}
