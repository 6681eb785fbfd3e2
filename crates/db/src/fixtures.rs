use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_TICKET_IDS: &[&str] =
    &["TCK-1001", "TCK-1002", "TCK-1003", "TCK-1004", "TCK-1005", "TCK-1006"];

const SEED_SLA_POLICY_IDS: &[&str] = &["sla-urgent", "sla-high", "sla-medium", "sla-low"];

const SEED_RULE_PRIORITIES: &[&str] = &["urgent", "high", "medium", "low"];

/// Expected stored state of each seeded ticket.
const SEED_TICKETS: &[SeedTicketContract] = &[
    SeedTicketContract { id: "TCK-1001", status: "open", priority: "urgent", zone: "North" },
    SeedTicketContract { id: "TCK-1002", status: "in_progress", priority: "high", zone: "North" },
    SeedTicketContract { id: "TCK-1003", status: "open", priority: "medium", zone: "South" },
    SeedTicketContract { id: "TCK-1004", status: "open", priority: "low", zone: "South" },
    SeedTicketContract { id: "TCK-1005", status: "resolved", priority: "urgent", zone: "East" },
    SeedTicketContract { id: "TCK-1006", status: "closed", priority: "high", zone: "North" },
];

/// Deterministic support desk dataset: one SLA policy and escalation rule per priority
/// and six tickets across zones and lifecycle states.
pub struct SupportSeedDataset;

impl SupportSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/support_seed_data.sql");

    /// Loads the dataset. Re-running replaces the seeded rows in place.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            tickets_seeded: SEED_TICKET_IDS.len(),
            sla_policies_seeded: SEED_SLA_POLICY_IDS.len(),
            escalation_rules_seeded: SEED_RULE_PRIORITIES.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let quoted_policies = sql_array_from_ids(SEED_SLA_POLICY_IDS);
        let policy_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM sla_policy WHERE id IN {quoted_policies}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("sla-policies", policy_count == SEED_SLA_POLICY_IDS.len() as i64));

        let quoted_priorities = sql_array_from_ids(SEED_RULE_PRIORITIES);
        let rule_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM escalation_rule WHERE priority IN {quoted_priorities}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("escalation-rules", rule_count == SEED_RULE_PRIORITIES.len() as i64));

        for ticket in SEED_TICKETS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM ticket
                               WHERE id = ?1 AND status = ?2 AND priority = ?3 AND zone = ?4)",
            )
            .bind(ticket.id)
            .bind(ticket.status)
            .bind(ticket.priority)
            .bind(ticket.zone)
            .fetch_one(pool)
            .await?;
            checks.push((ticket.id, exists == 1));
        }

        let missing_deadline: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM ticket WHERE id IN {} AND sla_due_date IS NULL",
            sql_array_from_ids(SEED_TICKET_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("ticket-deadlines", missing_deadline == 0));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        sqlx::query(&format!(
            "DELETE FROM ticket WHERE id IN {}",
            sql_array_from_ids(SEED_TICKET_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "DELETE FROM escalation_rule WHERE priority IN {}",
            sql_array_from_ids(SEED_RULE_PRIORITIES)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "DELETE FROM sla_policy WHERE id IN {}",
            sql_array_from_ids(SEED_SLA_POLICY_IDS)
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedTicketContract {
    id: &'static str,
    status: &'static str,
    priority: &'static str,
    zone: &'static str,
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub tickets_seeded: usize,
    pub sla_policies_seeded: usize,
    pub escalation_rules_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!SupportSeedDataset::SQL.is_empty());
        for id in SEED_TICKET_IDS {
            assert!(SupportSeedDataset::SQL.contains(&format!("'{id}'")), "missing {id}");
        }
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");

        migrations::run_pending(&pool).await.expect("run migrations");

        let first = SupportSeedDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification =
            SupportSeedDataset::verify(&pool).await.expect("verify seed fixtures");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.tickets_seeded, 6);

        SupportSeedDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification =
            SupportSeedDataset::verify(&pool).await.expect("re-verify seed fixtures");
        assert!(second_verification.all_present);
        assert_eq!(first_verification.checks, second_verification.checks);

        let ticket_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM ticket")
            .fetch_one(&pool)
            .await
            .expect("count tickets");
        assert_eq!(ticket_count, 6);
    }

    #[tokio::test]
    async fn clean_removes_seeded_rows() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");
        SupportSeedDataset::load(&pool).await.expect("load seed fixtures");

        SupportSeedDataset::clean(&pool).await.expect("clean");

        let verification = SupportSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM ticket")
            .fetch_one(&pool)
            .await
            .expect("count tickets");
        assert_eq!(remaining, 0);
    }
}
