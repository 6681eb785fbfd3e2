//! Ticket creation, edits and scoped reads.
//!
//! Edits are plain read-modify-write cycles on the versioned record, so a concurrent
//! sweep write is detected by the store instead of being overwritten.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::access;
use crate::clock::SlaClock;
use crate::domain::ticket::{Priority, Ticket, TicketId, TicketPatch, TicketStatus};
use crate::domain::viewer::Viewer;
use crate::errors::ApplicationError;
use crate::policy_source::PolicySource;
use crate::sla::{AssignmentTrigger, SlaPolicyMatcher};
use crate::store::{StoreError, TicketStore, UpdateOutcome};

pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    pub id: Option<TicketId>,
    pub title: String,
    pub priority: Priority,
    pub category: Option<String>,
    pub zone: String,
    pub branch: String,
    pub assigned_to: Option<String>,
    pub created_by: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketUpdate {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub category: Option<Option<String>>,
    pub zone: Option<String>,
    pub branch: Option<String>,
    pub assigned_to: Option<Option<String>>,
}

pub struct TicketService {
    store: Arc<dyn TicketStore>,
    policies: Arc<dyn PolicySource>,
    clock: Arc<dyn SlaClock>,
    matcher: SlaPolicyMatcher,
    conflict_retries: u32,
}

impl TicketService {
    pub fn new(
        store: Arc<dyn TicketStore>,
        policies: Arc<dyn PolicySource>,
        clock: Arc<dyn SlaClock>,
    ) -> Self {
        Self {
            store,
            policies,
            clock,
            matcher: SlaPolicyMatcher,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    pub async fn create(&self, new_ticket: NewTicket) -> Result<Ticket, ApplicationError> {
        let now = self.clock.now();
        let tables = self
            .policies
            .load()
            .await
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;

        let mut ticket = Ticket {
            id: new_ticket.id.unwrap_or_else(|| TicketId(Uuid::new_v4().to_string())),
            title: new_ticket.title,
            status: TicketStatus::Open,
            priority: new_ticket.priority,
            category: new_ticket.category,
            zone: new_ticket.zone,
            branch: new_ticket.branch,
            assigned_to: new_ticket.assigned_to,
            created_by: new_ticket.created_by,
            created_at: now,
            updated_at: now,
            sla_id: None,
            sla_due_date: None,
            escalation_level: 0,
            escalated_to: None,
            breached_sla: false,
            version: 1,
        };

        let (assignment, _fallback) =
            self.matcher.assign(&ticket, &tables, AssignmentTrigger::Creation, now);
        ticket.sla_id = Some(assignment.sla_id);
        ticket.sla_due_date = Some(assignment.sla_due_date);

        self.store.insert(ticket.clone()).await.map_err(persistence)?;
        info!(
            event_name = "tickets.created",
            ticket_id = %ticket.id,
            priority = ticket.priority.as_str(),
            sla_id = ticket.sla_id.as_deref().unwrap_or("none"),
            "ticket created"
        );
        Ok(ticket)
    }

    pub async fn update(
        &self,
        id: &TicketId,
        update: TicketUpdate,
    ) -> Result<Ticket, ApplicationError> {
        let mut attempt = 0;
        loop {
            let current = self
                .store
                .get(id)
                .await
                .map_err(persistence)?
                .ok_or_else(|| ApplicationError::NotFound(id.clone()))?;

            let patch = self.build_patch(&current, &update).await?;
            if patch.is_empty() {
                return Ok(current);
            }

            match self.store.update_if(id, current.version, &patch).await.map_err(persistence)? {
                UpdateOutcome::Applied(ticket) => {
                    info!(
                        event_name = "tickets.updated",
                        ticket_id = %ticket.id,
                        version = ticket.version,
                        status = ticket.status.as_str(),
                        "ticket updated"
                    );
                    return Ok(ticket);
                }
                UpdateOutcome::NotFound => return Err(ApplicationError::NotFound(id.clone())),
                UpdateOutcome::Conflict { current_version } => {
                    attempt += 1;
                    debug!(
                        event_name = "tickets.update_conflict",
                        ticket_id = %id,
                        expected_version = current.version,
                        current_version,
                        attempt,
                        "ticket changed during edit; re-reading"
                    );
                    if attempt > self.conflict_retries {
                        return Err(ApplicationError::Conflict(id.clone()));
                    }
                }
            }
        }
    }

    async fn build_patch(
        &self,
        current: &Ticket,
        update: &TicketUpdate,
    ) -> Result<TicketPatch, ApplicationError> {
        let now = self.clock.now();
        let mut patch = TicketPatch::default();

        if let Some(status) = update.status.filter(|status| *status != current.status) {
            current.ensure_transition(status)?;
            patch.status = Some(status);
            if status.is_escalation_inert() {
                // Final breach value as of closure; the sweep never touches it again.
                let breached = current.sla_due_date.is_some_and(|due| now > due);
                if breached != current.breached_sla {
                    patch.breached_sla = Some(breached);
                }
            }
        }

        let priority_changed = update.priority.is_some_and(|priority| priority != current.priority);
        let category_changed =
            update.category.as_ref().is_some_and(|category| *category != current.category);
        if priority_changed {
            patch.priority = update.priority;
        }
        if category_changed {
            patch.category = update.category.clone();
        }

        // A ticket resolved or closed by this same update keeps the deadline its breach
        // flag was frozen against.
        let inert_after = patch.status.unwrap_or(current.status).is_escalation_inert();
        if (priority_changed || category_changed) && !inert_after {
            let tables = self
                .policies
                .load()
                .await
                .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
            let mut reclassified = current.clone();
            if let Some(priority) = update.priority {
                reclassified.priority = priority;
            }
            let (assignment, _fallback) =
                self.matcher.assign(&reclassified, &tables, AssignmentTrigger::Reclassified, now);
            patch.sla_id = Some(assignment.sla_id);
            patch.sla_due_date = Some(assignment.sla_due_date);
        }

        if let Some(zone) = update.zone.as_ref().filter(|zone| **zone != current.zone) {
            patch.zone = Some(zone.clone());
        }
        if let Some(branch) = update.branch.as_ref().filter(|branch| **branch != current.branch) {
            patch.branch = Some(branch.clone());
        }
        if let Some(assigned_to) =
            update.assigned_to.as_ref().filter(|assigned_to| **assigned_to != current.assigned_to)
        {
            patch.assigned_to = Some(assigned_to.clone());
        }

        if !patch.is_empty() {
            patch.updated_at = Some(now);
        }
        Ok(patch)
    }

    pub async fn list_for(&self, viewer: &Viewer) -> Result<Vec<Ticket>, ApplicationError> {
        let snapshot = self.store.list().await.map_err(persistence)?;
        Ok(access::scope(viewer, snapshot))
    }

    /// A ticket the viewer may not see is reported as not found.
    pub async fn get_for(
        &self,
        viewer: &Viewer,
        id: &TicketId,
    ) -> Result<Ticket, ApplicationError> {
        self.store
            .get(id)
            .await
            .map_err(persistence)?
            .filter(|ticket| access::can_view(viewer, ticket))
            .ok_or_else(|| ApplicationError::NotFound(id.clone()))
    }
}

fn persistence(error: StoreError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{NewTicket, TicketService, TicketUpdate};
    use crate::clock::ManualClock;
    use crate::domain::policy::{PolicyTables, SlaPolicy};
    use crate::domain::ticket::{Priority, Ticket, TicketId, TicketPatch, TicketStatus};
    use crate::domain::viewer::{Role, Viewer};
    use crate::errors::{ApplicationError, DomainError};
    use crate::policy_source::StaticPolicySource;
    use crate::store::{InMemoryTicketStore, StoreError, TicketStore, UpdateOutcome};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).single().expect("valid time")
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
        .with_sla_policy(SlaPolicy {
            id: "sla-high".to_string(),
            priority: Priority::High,
            response_minutes: 60,
            resolution_minutes: 480,
        })
    }

    fn service() -> (TicketService, Arc<InMemoryTicketStore>, ManualClock) {
        let store = Arc::new(InMemoryTicketStore::new());
        let clock = ManualClock::new(t0());
        let service = TicketService::new(
            store.clone(),
            Arc::new(StaticPolicySource::new(tables())),
            Arc::new(clock.clone()),
        );
        (service, store, clock)
    }

    fn new_ticket(id: &str, priority: Priority) -> NewTicket {
        NewTicket {
            id: Some(TicketId(id.to_string())),
            title: "Cannot log in".to_string(),
            priority,
            category: Some("access".to_string()),
            zone: "North".to_string(),
            branch: "HQ".to_string(),
            assigned_to: None,
            created_by: "Dana".to_string(),
        }
    }

    #[tokio::test]
    async fn create_stamps_deadline_from_creation_time() {
        let (service, _, _) = service();

        let ticket = service.create(new_ticket("T-1", Priority::Urgent)).await.expect("create");

        assert_eq!(ticket.sla_id.as_deref(), Some("sla-urgent"));
        assert_eq!(ticket.sla_due_date, Some(t0() + Duration::minutes(240)));
        assert_eq!(ticket.version, 1);
        assert_eq!(ticket.escalation_level, 0);
    }

    #[tokio::test]
    async fn create_falls_back_to_default_policy() {
        let (service, _, _) = service();

        let ticket = service.create(new_ticket("T-1", Priority::Low)).await.expect("create");

        assert_eq!(ticket.sla_id.as_deref(), Some("sla-default"));
        assert_eq!(ticket.sla_due_date, Some(t0() + Duration::minutes(1440)));
    }

    #[tokio::test]
    async fn priority_change_rebaselines_from_now() {
        let (service, _, clock) = service();
        service.create(new_ticket("T-1", Priority::Urgent)).await.expect("create");

        clock.advance(Duration::minutes(90));
        let updated = service
            .update(
                &TicketId("T-1".into()),
                TicketUpdate { priority: Some(Priority::High), ..TicketUpdate::default() },
            )
            .await
            .expect("update");

        assert_eq!(updated.sla_id.as_deref(), Some("sla-high"));
        assert_eq!(updated.sla_due_date, Some(t0() + Duration::minutes(90 + 480)));
        assert_eq!(updated.version, 2);
    }

    #[tokio::test]
    async fn unrelated_edit_keeps_deadline() {
        let (service, _, clock) = service();
        let created = service.create(new_ticket("T-1", Priority::Urgent)).await.expect("create");

        clock.advance(Duration::minutes(30));
        let updated = service
            .update(
                &TicketId("T-1".into()),
                TicketUpdate {
                    assigned_to: Some(Some("Asha".to_string())),
                    status: Some(TicketStatus::InProgress),
                    ..TicketUpdate::default()
                },
            )
            .await
            .expect("update");

        assert_eq!(updated.sla_due_date, created.sla_due_date);
        assert_eq!(updated.assigned_to.as_deref(), Some("Asha"));
        assert_eq!(updated.updated_at, t0() + Duration::minutes(30));
    }

    #[tokio::test]
    async fn category_change_rebaselines_deadline() {
        let (service, _, clock) = service();
        service.create(new_ticket("T-1", Priority::Urgent)).await.expect("create");

        clock.advance(Duration::minutes(10));
        let updated = service
            .update(
                &TicketId("T-1".into()),
                TicketUpdate {
                    category: Some(Some("billing".to_string())),
                    ..TicketUpdate::default()
                },
            )
            .await
            .expect("update");

        assert_eq!(updated.sla_due_date, Some(t0() + Duration::minutes(250)));
    }

    #[tokio::test]
    async fn closing_freezes_breach_as_of_closure() {
        let (service, _, clock) = service();
        service.create(new_ticket("T-1", Priority::Urgent)).await.expect("create");

        clock.advance(Duration::minutes(300));
        let closed = service
            .update(
                &TicketId("T-1".into()),
                TicketUpdate { status: Some(TicketStatus::Closed), ..TicketUpdate::default() },
            )
            .await
            .expect("close");

        assert!(closed.breached_sla);
    }

    #[tokio::test]
    async fn closing_with_reclassification_keeps_frozen_deadline() {
        let (service, _, clock) = service();
        let created = service.create(new_ticket("T-1", Priority::Urgent)).await.expect("create");

        clock.advance(Duration::minutes(300));
        let closed = service
            .update(
                &TicketId("T-1".into()),
                TicketUpdate {
                    status: Some(TicketStatus::Closed),
                    priority: Some(Priority::High),
                    ..TicketUpdate::default()
                },
            )
            .await
            .expect("close");

        assert_eq!(closed.priority, Priority::High);
        assert_eq!(closed.sla_id, created.sla_id);
        assert_eq!(closed.sla_due_date, created.sla_due_date);
        let due = closed.sla_due_date.expect("deadline assigned");
        assert_eq!(closed.breached_sla, t0() + Duration::minutes(300) > due);
        assert!(closed.breached_sla);
    }

    #[tokio::test]
    async fn closed_ticket_rejects_reopen() {
        let (service, _, _) = service();
        service.create(new_ticket("T-1", Priority::Urgent)).await.expect("create");
        let id = TicketId("T-1".into());
        service
            .update(&id, TicketUpdate { status: Some(TicketStatus::Closed), ..TicketUpdate::default() })
            .await
            .expect("close");

        let error = service
            .update(&id, TicketUpdate { status: Some(TicketStatus::Open), ..TicketUpdate::default() })
            .await
            .expect_err("closed -> open");

        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::InvalidStatusTransition { .. })
        ));
    }

    /// Store where a sweep write lands between each of the first `races` reads and the
    /// write that follows them.
    struct RacingStore {
        inner: InMemoryTicketStore,
        races: std::sync::Mutex<u32>,
    }

    impl RacingStore {
        fn new(races: u32) -> Self {
            Self { inner: InMemoryTicketStore::new(), races: std::sync::Mutex::new(races) }
        }

        fn take_race(&self) -> bool {
            let mut races = match self.races.lock() {
                Ok(races) => races,
                Err(poisoned) => poisoned.into_inner(),
            };
            if *races == 0 {
                return false;
            }
            *races -= 1;
            true
        }
    }

    #[async_trait]
    impl TicketStore for RacingStore {
        async fn insert(&self, ticket: Ticket) -> Result<(), StoreError> {
            self.inner.insert(ticket).await
        }

        async fn get(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError> {
            let snapshot = self.inner.get(id).await?;
            if let Some(ticket) = snapshot.as_ref().filter(|_| self.take_race()) {
                let sweep_write = TicketPatch {
                    escalation_level: Some(ticket.escalation_level + 1),
                    ..TicketPatch::default()
                };
                self.inner.update_if(id, ticket.version, &sweep_write).await?;
            }
            Ok(snapshot)
        }

        async fn list(&self) -> Result<Vec<Ticket>, StoreError> {
            self.inner.list().await
        }

        async fn list_open(&self) -> Result<Vec<Ticket>, StoreError> {
            self.inner.list_open().await
        }

        async fn update_if(
            &self,
            id: &TicketId,
            expected_version: u64,
            patch: &TicketPatch,
        ) -> Result<UpdateOutcome, StoreError> {
            self.inner.update_if(id, expected_version, patch).await
        }
    }

    async fn racing_service(races: u32, retries: u32) -> (TicketService, Arc<RacingStore>) {
        let store = Arc::new(RacingStore::new(0));
        let service = TicketService::new(
            store.clone(),
            Arc::new(StaticPolicySource::new(tables())),
            Arc::new(ManualClock::new(t0())),
        )
        .with_conflict_retries(retries);
        service.create(new_ticket("T-1", Priority::Urgent)).await.expect("create");
        *store.races.lock().expect("races lock") = races;
        (service, store)
    }

    #[tokio::test]
    async fn update_retries_after_concurrent_write() {
        let (service, store) = racing_service(1, 3).await;
        let id = TicketId("T-1".into());

        let updated = service
            .update(&id, TicketUpdate { zone: Some("South".to_string()), ..TicketUpdate::default() })
            .await
            .expect("update");

        assert_eq!(updated.zone, "South");
        assert_eq!(updated.escalation_level, 1, "sweep write is preserved");
        assert_eq!(updated.version, 3);
        let stored = store.get(&id).await.expect("get").expect("exists");
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn update_gives_up_after_retries_are_exhausted() {
        let (service, store) = racing_service(3, 2).await;
        let id = TicketId("T-1".into());

        let error = service
            .update(&id, TicketUpdate { zone: Some("South".to_string()), ..TicketUpdate::default() })
            .await
            .expect_err("every attempt loses the race");

        assert_eq!(error, ApplicationError::Conflict(id.clone()));
        let stored = store.get(&id).await.expect("get").expect("exists");
        assert_eq!(stored.zone, "North");
        assert_eq!(stored.escalation_level, 3);
    }

    #[tokio::test]
    async fn reads_are_scoped_to_viewer() {
        let (service, _, _) = service();
        service.create(new_ticket("T-1", Priority::Urgent)).await.expect("create");
        let mut south = new_ticket("T-2", Priority::High);
        south.zone = "South".to_string();
        south.assigned_to = Some("Asha".to_string());
        service.create(south).await.expect("create");
        let mut east = new_ticket("T-3", Priority::High);
        east.zone = "East".to_string();
        service.create(east).await.expect("create");

        let asha = Viewer::new("u-1", Role::Agent, "North", "Asha");
        let visible = service.list_for(&asha).await.expect("list");
        let ids: Vec<&str> = visible.iter().map(|ticket| ticket.id.0.as_str()).collect();
        assert_eq!(ids, vec!["T-1", "T-2"]);

        let hidden = service.get_for(&asha, &TicketId("T-3".into())).await;
        assert!(matches!(hidden, Err(ApplicationError::NotFound(_))));
    }
}
