use async_trait::async_trait;
use chrono::{DateTime, Utc};

use supportdesk_core::lease::{LeaseError, SweepLease};

use super::RepositoryError;
use crate::DbPool;

const ESCALATION_SWEEP: &str = "escalation_sweep";

/// Sweep lease stored as a single row, so the server scheduler and one-shot CLI sweeps
/// against the same database exclude each other.
pub struct SqlSweepLease {
    pool: DbPool,
}

impl SqlSweepLease {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn claim(
        &self,
        holder: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO sweep_lease (name, holder, expires_at_ms) VALUES (?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                 holder = excluded.holder,
                 expires_at_ms = excluded.expires_at_ms
             WHERE sweep_lease.holder = excluded.holder OR sweep_lease.expires_at_ms <= ?",
        )
        .bind(ESCALATION_SWEEP)
        .bind(holder)
        .bind(expires_at.timestamp_millis())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn drop_claim(&self, holder: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM sweep_lease WHERE name = ? AND holder = ?")
            .bind(ESCALATION_SWEEP)
            .bind(holder)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SweepLease for SqlSweepLease {
    async fn try_acquire(
        &self,
        holder: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, LeaseError> {
        self.claim(holder, now, expires_at).await.map_err(|error| LeaseError(error.to_string()))
    }

    async fn release(&self, holder: &str) -> Result<(), LeaseError> {
        self.drop_claim(holder).await.map_err(|error| LeaseError(error.to_string()))
    }
}
