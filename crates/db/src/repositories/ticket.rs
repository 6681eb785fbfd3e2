use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use supportdesk_core::domain::ticket::{Priority, Ticket, TicketId, TicketPatch, TicketStatus};
use supportdesk_core::store::{StoreError, TicketStore, UpdateOutcome};

use super::{decode_error, RepositoryError};
use crate::DbPool;

const TICKET_COLUMNS: &str = "id, title, status, priority, category, zone, branch, assigned_to,
    created_by, created_at, updated_at, sla_id, sla_due_date, escalation_level,
    escalated_to, breached_sla, version";

/// SQLite-backed ticket store. The conditional write is a single
/// `UPDATE ... WHERE id = ? AND version = ?` so no other writer can slip in between.
pub struct SqlTicketStore {
    pool: DbPool,
}

impl SqlTicketStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TICKET_COLUMNS} FROM ticket WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_ticket).transpose()
    }

    async fn fetch_many(&self, open_only: bool) -> Result<Vec<Ticket>, RepositoryError> {
        let sql = if open_only {
            format!(
                "SELECT {TICKET_COLUMNS} FROM ticket
                 WHERE status NOT IN ('resolved', 'closed') ORDER BY id ASC"
            )
        } else {
            format!("SELECT {TICKET_COLUMNS} FROM ticket ORDER BY id ASC")
        };

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_ticket).collect()
    }

    async fn write_if(
        &self,
        id: &TicketId,
        expected_version: u64,
        patch: &TicketPatch,
    ) -> Result<UpdateOutcome, RepositoryError> {
        let Some(mut ticket) = self.fetch(id).await? else {
            return Ok(UpdateOutcome::NotFound);
        };
        if ticket.version != expected_version {
            return Ok(UpdateOutcome::Conflict { current_version: ticket.version });
        }

        patch.apply_to(&mut ticket);
        self.write_patched(id, expected_version, ticket).await
    }

    /// Persists an already-patched `ticket` only while the row still holds `expected_version`.
    async fn write_patched(
        &self,
        id: &TicketId,
        expected_version: u64,
        ticket: Ticket,
    ) -> Result<UpdateOutcome, RepositoryError> {
        let result = sqlx::query(
            "UPDATE ticket SET
                 status = ?, priority = ?, category = ?, zone = ?, branch = ?, assigned_to = ?,
                 updated_at = ?, sla_id = ?, sla_due_date = ?, escalation_level = ?,
                 escalated_to = ?, breached_sla = ?, version = ?
             WHERE id = ? AND version = ?",
        )
        .bind(ticket.status.as_str())
        .bind(ticket.priority.as_str())
        .bind(&ticket.category)
        .bind(&ticket.zone)
        .bind(&ticket.branch)
        .bind(&ticket.assigned_to)
        .bind(ticket.updated_at.to_rfc3339())
        .bind(&ticket.sla_id)
        .bind(ticket.sla_due_date.map(|due| due.to_rfc3339()))
        .bind(i64::from(ticket.escalation_level))
        .bind(&ticket.escalated_to)
        .bind(ticket.breached_sla)
        .bind(to_db_version(ticket.version)?)
        .bind(&id.0)
        .bind(to_db_version(expected_version)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(UpdateOutcome::Applied(ticket));
        }

        // Lost the race between read and write.
        match self.fetch(id).await? {
            Some(current) => Ok(UpdateOutcome::Conflict { current_version: current.version }),
            None => Ok(UpdateOutcome::NotFound),
        }
    }
}

#[async_trait]
impl TicketStore for SqlTicketStore {
    async fn insert(&self, ticket: Ticket) -> Result<(), StoreError> {
        let result = sqlx::query(&format!(
            "INSERT INTO ticket ({TICKET_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&ticket.id.0)
        .bind(&ticket.title)
        .bind(ticket.status.as_str())
        .bind(ticket.priority.as_str())
        .bind(&ticket.category)
        .bind(&ticket.zone)
        .bind(&ticket.branch)
        .bind(&ticket.assigned_to)
        .bind(&ticket.created_by)
        .bind(ticket.created_at.to_rfc3339())
        .bind(ticket.updated_at.to_rfc3339())
        .bind(&ticket.sla_id)
        .bind(ticket.sla_due_date.map(|due| due.to_rfc3339()))
        .bind(i64::from(ticket.escalation_level))
        .bind(&ticket.escalated_to)
        .bind(ticket.breached_sla)
        .bind(to_db_version(ticket.version.max(1))?)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Err(StoreError::Duplicate(ticket.id))
            }
            Err(error) => Err(RepositoryError::from(error).into()),
        }
    }

    async fn get(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError> {
        Ok(self.fetch(id).await?)
    }

    async fn list(&self) -> Result<Vec<Ticket>, StoreError> {
        Ok(self.fetch_many(false).await?)
    }

    async fn list_open(&self) -> Result<Vec<Ticket>, StoreError> {
        Ok(self.fetch_many(true).await?)
    }

    async fn update_if(
        &self,
        id: &TicketId,
        expected_version: u64,
        patch: &TicketPatch,
    ) -> Result<UpdateOutcome, StoreError> {
        Ok(self.write_if(id, expected_version, patch).await?)
    }
}

fn to_db_version(version: u64) -> Result<i64, RepositoryError> {
    i64::try_from(version).map_err(decode_error)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{value}`: {error}")))
}

fn row_to_ticket(row: &SqliteRow) -> Result<Ticket, RepositoryError> {
    let status: String = row.try_get("status").map_err(decode_error)?;
    let priority: String = row.try_get("priority").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;
    let sla_due_date: Option<String> = row.try_get("sla_due_date").map_err(decode_error)?;
    let escalation_level: i64 = row.try_get("escalation_level").map_err(decode_error)?;
    let version: i64 = row.try_get("version").map_err(decode_error)?;

    Ok(Ticket {
        id: TicketId(row.try_get("id").map_err(decode_error)?),
        title: row.try_get("title").map_err(decode_error)?,
        status: TicketStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown ticket status `{status}`")))?,
        priority: Priority::parse(&priority)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown priority `{priority}`")))?,
        category: row.try_get("category").map_err(decode_error)?,
        zone: row.try_get("zone").map_err(decode_error)?,
        branch: row.try_get("branch").map_err(decode_error)?,
        assigned_to: row.try_get("assigned_to").map_err(decode_error)?,
        created_by: row.try_get("created_by").map_err(decode_error)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        sla_id: row.try_get("sla_id").map_err(decode_error)?,
        sla_due_date: sla_due_date.as_deref().map(parse_timestamp).transpose()?,
        escalation_level: u32::try_from(escalation_level).map_err(decode_error)?,
        escalated_to: row.try_get("escalated_to").map_err(decode_error)?,
        breached_sla: row.try_get("breached_sla").map_err(decode_error)?,
        version: u64::try_from(version).map_err(decode_error)?,
    })
}
