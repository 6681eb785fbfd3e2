//! SLA breach and escalation sweep.
//!
//! One sweep reads every open ticket, recomputes its breach flag and escalation level
//! against the current policy tables, and commits changes with a version-checked write.
//! Only the writer that wins the compare-and-set emits notifications, so each level
//! transition produces exactly one `escalate` event.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::SlaClock;
use crate::domain::notification::NotificationEvent;
use crate::domain::policy::PolicyTables;
use crate::domain::ticket::{Priority, Ticket, TicketPatch};
use crate::errors::EngineIssue;
use crate::escalation::{highest_reached, EscalationRuleMatcher, EscalationThreshold};
use crate::lease::SweepLease;
use crate::notification::NotificationPort;
use crate::policy_source::PolicySource;
use crate::store::{TicketStore, UpdateOutcome};

/// Configuration for the escalation engine
#[derive(Clone, Debug)]
pub struct EscalationEngineConfig {
    /// Tickets not reached within this budget are left for the next sweep
    pub soft_deadline: Duration,
    /// Highest level generated for rules that do not set one
    pub default_max_level: u32,
}

impl Default for EscalationEngineConfig {
    fn default() -> Self {
        Self {
            soft_deadline: Duration::seconds(45),
            default_max_level: crate::escalation::DEFAULT_MAX_LEVEL,
        }
    }
}

/// Staged changes for one ticket plus the notifications they imply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketEvaluation {
    pub patch: TicketPatch,
    pub breach_started: bool,
    /// Levels crossed by this evaluation, ascending.
    pub crossed: Vec<EscalationThreshold>,
}

impl TicketEvaluation {
    pub fn events(&self, ticket: &Ticket, occurred_at: DateTime<Utc>) -> Vec<NotificationEvent> {
        let mut events = Vec::with_capacity(self.crossed.len() + 1);
        if self.breach_started {
            events.push(NotificationEvent::breach(
                ticket.id.clone(),
                ticket.sla_due_date,
                occurred_at,
            ));
        }
        events.extend(self.crossed.iter().map(|threshold| {
            NotificationEvent::escalate(
                ticket.id.clone(),
                threshold.level,
                threshold.escalate_to.clone(),
                threshold.notify_users.clone(),
                occurred_at,
            )
        }));
        events
    }
}

/// Pure evaluation of one ticket at `now`. `None` means nothing to write.
pub fn evaluate(
    ticket: &Ticket,
    thresholds: &[EscalationThreshold],
    now: DateTime<Utc>,
) -> Option<TicketEvaluation> {
    if ticket.status.is_escalation_inert() {
        return None;
    }

    let mut patch = TicketPatch::default();
    let mut breach_started = false;

    let breached = ticket.is_breached_at(now);
    if breached != ticket.breached_sla {
        patch.breached_sla = Some(breached);
        breach_started = breached;
    }

    let mut crossed = Vec::new();
    let elapsed = now - ticket.created_at;
    if let Some(reached) = highest_reached(thresholds, elapsed) {
        if reached.level > ticket.escalation_level {
            patch.escalation_level = Some(reached.level);
            patch.escalated_to = Some(reached.escalate_to.clone());
            crossed = thresholds
                .iter()
                .filter(|threshold| {
                    threshold.level > ticket.escalation_level
                        && threshold.level <= reached.level
                        && threshold.is_reached(elapsed)
                })
                .cloned()
                .collect();
            crossed.sort_by_key(|threshold| threshold.level);
        }
    }

    if patch.is_empty() {
        return None;
    }

    Some(TicketEvaluation { patch, breach_started, crossed })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub examined: usize,
    pub updated: usize,
    pub conflicts: usize,
    pub deferred: usize,
    pub events_emitted: usize,
    pub delivery_failures: usize,
    pub issues: Vec<EngineIssue>,
}

impl SweepReport {
    fn started(at: DateTime<Utc>) -> Self {
        Self {
            started_at: at,
            finished_at: at,
            examined: 0,
            updated: 0,
            conflicts: 0,
            deferred: 0,
            events_emitted: 0,
            delivery_failures: 0,
            issues: Vec::new(),
        }
    }

    fn record_issue(&mut self, issue: EngineIssue) {
        if !self.issues.contains(&issue) {
            self.issues.push(issue);
        }
    }
}

pub struct EscalationEngine {
    store: Arc<dyn TicketStore>,
    policies: Arc<dyn PolicySource>,
    notifier: Arc<dyn NotificationPort>,
    clock: Arc<dyn SlaClock>,
    matcher: EscalationRuleMatcher,
    config: EscalationEngineConfig,
    last_good_tables: Mutex<Option<PolicyTables>>,
    lease: Option<Arc<dyn SweepLease>>,
    holder: String,
}

impl EscalationEngine {
    pub fn new(
        store: Arc<dyn TicketStore>,
        policies: Arc<dyn PolicySource>,
        notifier: Arc<dyn NotificationPort>,
        clock: Arc<dyn SlaClock>,
    ) -> Self {
        Self::with_config(store, policies, notifier, clock, EscalationEngineConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn TicketStore>,
        policies: Arc<dyn PolicySource>,
        notifier: Arc<dyn NotificationPort>,
        clock: Arc<dyn SlaClock>,
        config: EscalationEngineConfig,
    ) -> Self {
        Self {
            store,
            policies,
            notifier,
            clock,
            matcher: EscalationRuleMatcher::new(config.default_max_level),
            config,
            last_good_tables: Mutex::new(None),
            lease: None,
            holder: format!("sweep-{}", Uuid::new_v4()),
        }
    }

    /// Skips a sweep while another engine holds `lease`, so separate processes sweeping the
    /// same store never overlap.
    pub fn with_lease(mut self, lease: Arc<dyn SweepLease>) -> Self {
        self.lease = Some(lease);
        self
    }

    /// Runs one pass over all open tickets. Never fails: every problem is logged and
    /// recorded on the report, and unfinished work is picked up by the next sweep.
    pub async fn sweep(&self) -> SweepReport {
        let started_at = self.clock.now();
        let mut report = SweepReport::started(started_at);

        let Some(claimed) = self.claim(started_at, &mut report).await else {
            report.finished_at = self.clock.now();
            return report;
        };
        self.run_pass(started_at, &mut report).await;
        if claimed {
            self.release().await;
        }
        report
    }

    /// `None` when another holder owns the lease. `Some(true)` when this engine must
    /// release it afterwards.
    async fn claim(&self, now: DateTime<Utc>, report: &mut SweepReport) -> Option<bool> {
        let Some(lease) = &self.lease else {
            return Some(false);
        };
        let ttl = self.config.soft_deadline.checked_mul(2).unwrap_or(self.config.soft_deadline);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);

        match lease.try_acquire(&self.holder, now, expires_at).await {
            Ok(true) => Some(true),
            Ok(false) => {
                info!(
                    event_name = "engine.sweep.lease_held",
                    correlation_id = "sweep",
                    holder = %self.holder,
                    "another process is sweeping; skipping"
                );
                report.record_issue(EngineIssue::SchedulerOverrun);
                None
            }
            Err(lease_error) => {
                warn!(
                    event_name = "engine.sweep.lease_failed",
                    correlation_id = "sweep",
                    error = %lease_error,
                    "sweep lease unavailable; sweeping without it"
                );
                Some(false)
            }
        }
    }

    async fn release(&self) {
        let Some(lease) = &self.lease else {
            return;
        };
        if let Err(lease_error) = lease.release(&self.holder).await {
            warn!(
                event_name = "engine.sweep.lease_release_failed",
                correlation_id = "sweep",
                error = %lease_error,
                "sweep lease could not be released; it will expire"
            );
        }
    }

    async fn run_pass(&self, started_at: DateTime<Utc>, report: &mut SweepReport) {
        let deadline = started_at
            .checked_add_signed(self.config.soft_deadline)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        info!(
            event_name = "engine.sweep.started",
            correlation_id = "sweep",
            started_at = %started_at.to_rfc3339(),
            "escalation sweep started"
        );

        let Some(tables) = self.refresh_tables(report).await else {
            report.finished_at = self.clock.now();
            return;
        };

        let tickets = match self.store.list_open().await {
            Ok(tickets) => tickets,
            Err(store_error) => {
                error!(
                    event_name = "engine.sweep.list_failed",
                    correlation_id = "sweep",
                    error = %store_error,
                    "could not read open tickets"
                );
                report.finished_at = self.clock.now();
                return;
            }
        };

        let mut thresholds_by_priority: HashMap<Priority, Vec<EscalationThreshold>> =
            HashMap::new();
        let total = tickets.len();

        for (index, ticket) in tickets.into_iter().enumerate() {
            let now = self.clock.now();
            if now >= deadline {
                report.deferred = total - index;
                warn!(
                    event_name = "engine.sweep.deadline_reached",
                    correlation_id = "sweep",
                    deferred = report.deferred,
                    "soft deadline reached; remaining tickets deferred to next sweep"
                );
                break;
            }

            let thresholds = thresholds_by_priority.entry(ticket.priority).or_insert_with(|| {
                let (thresholds, issue) = self.matcher.thresholds(ticket.priority, &tables);
                if let Some(issue) = issue {
                    warn!(
                        event_name = "engine.policy.rule_unusable",
                        correlation_id = "sweep",
                        priority = ticket.priority.as_str(),
                        issue = %issue,
                        "escalation rule unusable for priority"
                    );
                    report.record_issue(issue);
                }
                thresholds
            });

            report.examined += 1;
            let Some(evaluation) = evaluate(&ticket, thresholds, now) else {
                continue;
            };

            self.commit(&ticket, evaluation, now, report).await;
        }

        report.finished_at = self.clock.now();
        info!(
            event_name = "engine.sweep.finished",
            correlation_id = "sweep",
            examined = report.examined,
            updated = report.updated,
            conflicts = report.conflicts,
            deferred = report.deferred,
            events_emitted = report.events_emitted,
            delivery_failures = report.delivery_failures,
            "escalation sweep finished"
        );
    }

    async fn refresh_tables(&self, report: &mut SweepReport) -> Option<PolicyTables> {
        let mut cached = self.last_good_tables.lock().await;
        match self.policies.load().await {
            Ok(tables) => {
                *cached = Some(tables.clone());
                Some(tables)
            }
            Err(load_error) => {
                warn!(
                    event_name = "engine.policy.refresh_failed",
                    correlation_id = "sweep",
                    error = %load_error,
                    reusing_previous = cached.is_some(),
                    "policy tables could not be refreshed"
                );
                report.record_issue(EngineIssue::PolicyRefresh { message: load_error.0 });
                cached.clone()
            }
        }
    }

    async fn commit(
        &self,
        ticket: &Ticket,
        evaluation: TicketEvaluation,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) {
        let outcome = self.store.update_if(&ticket.id, ticket.version, &evaluation.patch).await;

        match outcome {
            Ok(UpdateOutcome::Applied(stored)) => {
                report.updated += 1;
                if evaluation.patch.escalation_level.is_some() {
                    info!(
                        event_name = "engine.ticket.escalated",
                        correlation_id = "sweep",
                        ticket_id = %stored.id,
                        from_level = ticket.escalation_level,
                        to_level = stored.escalation_level,
                        escalated_to = stored.escalated_to.as_deref().unwrap_or("none"),
                        "ticket escalated"
                    );
                }
                if evaluation.patch.breached_sla.is_some() {
                    info!(
                        event_name = "engine.ticket.breach_changed",
                        correlation_id = "sweep",
                        ticket_id = %stored.id,
                        breached = stored.breached_sla,
                        "ticket breach flag updated"
                    );
                }
                for event in evaluation.events(&stored, now) {
                    self.deliver(event, report).await;
                }
            }
            Ok(UpdateOutcome::Conflict { current_version }) => {
                report.conflicts += 1;
                debug!(
                    event_name = "engine.ticket.conflict",
                    correlation_id = "sweep",
                    ticket_id = %ticket.id,
                    expected_version = ticket.version,
                    current_version,
                    "ticket changed since read; deferring to next sweep"
                );
                report.record_issue(EngineIssue::ConcurrencyConflict {
                    ticket_id: ticket.id.clone(),
                    expected_version: ticket.version,
                });
            }
            Ok(UpdateOutcome::NotFound) => {
                debug!(
                    event_name = "engine.ticket.vanished",
                    correlation_id = "sweep",
                    ticket_id = %ticket.id,
                    "ticket disappeared before write"
                );
            }
            Err(store_error) => {
                warn!(
                    event_name = "engine.ticket.write_failed",
                    correlation_id = "sweep",
                    ticket_id = %ticket.id,
                    error = %store_error,
                    "conditional write failed"
                );
                report.record_issue(EngineIssue::Store {
                    ticket_id: ticket.id.clone(),
                    message: store_error.to_string(),
                });
            }
        }
    }

    async fn deliver(&self, event: NotificationEvent, report: &mut SweepReport) {
        match self.notifier.deliver(&event).await {
            Ok(()) => report.events_emitted += 1,
            Err(delivery_error) => {
                // The committed transition stands; only the delivery is lost.
                report.delivery_failures += 1;
                warn!(
                    event_name = "engine.notification.failed",
                    correlation_id = "sweep",
                    ticket_id = %event.ticket_id,
                    event_type = event.event_type.as_str(),
                    error = %delivery_error,
                    "notification delivery failed"
                );
                report.record_issue(EngineIssue::NotificationDelivery {
                    ticket_id: event.ticket_id.clone(),
                    message: delivery_error.to_string(),
                });
            }
        }
    }
}
