use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::ticket::{Ticket, TicketId, TicketPatch};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("ticket already exists: {0}")]
    Duplicate(TicketId),
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("decode error: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The patch was applied; carries the stored ticket with its new version.
    Applied(Ticket),
    Conflict { current_version: u64 },
    NotFound,
}

/// Ticket persistence as the engine needs it: snapshot reads plus a version-checked write.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn insert(&self, ticket: Ticket) -> Result<(), StoreError>;

    async fn get(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError>;

    async fn list(&self) -> Result<Vec<Ticket>, StoreError>;

    /// Tickets whose status is neither resolved nor closed.
    async fn list_open(&self) -> Result<Vec<Ticket>, StoreError>;

    /// Applies `patch` only if the stored version still equals `expected_version`.
    async fn update_if(
        &self,
        id: &TicketId,
        expected_version: u64,
        patch: &TicketPatch,
    ) -> Result<UpdateOutcome, StoreError>;
}

#[derive(Default)]
pub struct InMemoryTicketStore {
    tickets: RwLock<BTreeMap<TicketId, Ticket>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn insert(&self, ticket: Ticket) -> Result<(), StoreError> {
        let mut tickets = self.tickets.write().await;
        if tickets.contains_key(&ticket.id) {
            return Err(StoreError::Duplicate(ticket.id));
        }
        tickets.insert(ticket.id.clone(), ticket);
        Ok(())
    }

    async fn get(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError> {
        let tickets = self.tickets.read().await;
        Ok(tickets.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Ticket>, StoreError> {
        let tickets = self.tickets.read().await;
        Ok(tickets.values().cloned().collect())
    }

    async fn list_open(&self) -> Result<Vec<Ticket>, StoreError> {
        let tickets = self.tickets.read().await;
        Ok(tickets
            .values()
            .filter(|ticket| !ticket.status.is_escalation_inert())
            .cloned()
            .collect())
    }

    async fn update_if(
        &self,
        id: &TicketId,
        expected_version: u64,
        patch: &TicketPatch,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut tickets = self.tickets.write().await;
        let Some(stored) = tickets.get_mut(id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        if stored.version != expected_version {
            return Ok(UpdateOutcome::Conflict { current_version: stored.version });
        }

        patch.apply_to(stored);
        Ok(UpdateOutcome::Applied(stored.clone()))
    }
}
