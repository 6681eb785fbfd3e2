use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::warn;

use supportdesk_core::domain::policy::{EscalationRule, PolicyTables, SlaPolicy};
use supportdesk_core::domain::ticket::Priority;
use supportdesk_core::policy_source::{PolicySource, PolicySourceError};

use super::{decode_error, RepositoryError};
use crate::DbPool;

/// SLA policies and escalation rules as maintained by administrators.
///
/// `load` re-reads both tables on every call so a sweep always sees the current rows.
pub struct SqlPolicyRepository {
    pool: DbPool,
    default_sla: SlaPolicy,
}

impl SqlPolicyRepository {
    pub fn new(pool: DbPool, default_sla: SlaPolicy) -> Self {
        Self { pool, default_sla }
    }

    pub async fn save_sla_policy(&self, policy: &SlaPolicy) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO sla_policy (id, priority, response_minutes, resolution_minutes, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(priority) DO UPDATE SET
                 id = excluded.id,
                 response_minutes = excluded.response_minutes,
                 resolution_minutes = excluded.resolution_minutes,
                 updated_at = excluded.updated_at",
        )
        .bind(&policy.id)
        .bind(policy.priority.as_str())
        .bind(policy.response_minutes)
        .bind(policy.resolution_minutes)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn save_escalation_rule(&self, rule: &EscalationRule) -> Result<(), RepositoryError> {
        let notify_users_json = serde_json::to_string(&rule.notify_users).map_err(decode_error)?;
        let level_offsets_json = serde_json::to_string(&rule.level_offsets).map_err(decode_error)?;
        let level_targets_json = serde_json::to_string(&rule.level_targets).map_err(decode_error)?;

        sqlx::query(
            "INSERT INTO escalation_rule (priority, trigger_after_minutes, level1_escalate,
                                          level2_escalate, notify_users_json, auto_escalate,
                                          level_offsets_json, level_targets_json, max_level,
                                          updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(priority) DO UPDATE SET
                 trigger_after_minutes = excluded.trigger_after_minutes,
                 level1_escalate = excluded.level1_escalate,
                 level2_escalate = excluded.level2_escalate,
                 notify_users_json = excluded.notify_users_json,
                 auto_escalate = excluded.auto_escalate,
                 level_offsets_json = excluded.level_offsets_json,
                 level_targets_json = excluded.level_targets_json,
                 max_level = excluded.max_level,
                 updated_at = excluded.updated_at",
        )
        .bind(rule.priority.as_str())
        .bind(rule.trigger_after_minutes)
        .bind(&rule.level1_escalate)
        .bind(&rule.level2_escalate)
        .bind(notify_users_json)
        .bind(rule.auto_escalate)
        .bind(level_offsets_json)
        .bind(level_targets_json)
        .bind(rule.max_level.map(i64::from))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn load_tables(&self) -> Result<PolicyTables, RepositoryError> {
        let mut tables = PolicyTables::new(self.default_sla.clone());

        let sla_rows = sqlx::query(
            "SELECT id, priority, response_minutes, resolution_minutes
             FROM sla_policy ORDER BY priority ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in &sla_rows {
            match row_to_sla_policy(row) {
                Ok(policy) => tables = tables.with_sla_policy(policy),
                Err(error) => warn!(
                    event_name = "db.policy.row_skipped",
                    table = "sla_policy",
                    error = %error,
                    "skipping unreadable sla policy row"
                ),
            }
        }

        let rule_rows = sqlx::query(
            "SELECT priority, trigger_after_minutes, level1_escalate, level2_escalate,
                    notify_users_json, auto_escalate, level_offsets_json, level_targets_json,
                    max_level
             FROM escalation_rule ORDER BY priority ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in &rule_rows {
            match row_to_escalation_rule(row) {
                Ok(rule) => tables = tables.with_escalation_rule(rule),
                Err(error) => warn!(
                    event_name = "db.policy.row_skipped",
                    table = "escalation_rule",
                    error = %error,
                    "skipping unreadable escalation rule row"
                ),
            }
        }

        Ok(tables)
    }
}

#[async_trait]
impl PolicySource for SqlPolicyRepository {
    async fn load(&self) -> Result<PolicyTables, PolicySourceError> {
        self.load_tables().await.map_err(|error| PolicySourceError(error.to_string()))
    }
}

fn parse_priority(value: &str) -> Result<Priority, RepositoryError> {
    Priority::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown priority `{value}`")))
}

fn row_to_sla_policy(row: &SqliteRow) -> Result<SlaPolicy, RepositoryError> {
    let priority: String = row.try_get("priority").map_err(decode_error)?;

    Ok(SlaPolicy {
        id: row.try_get("id").map_err(decode_error)?,
        priority: parse_priority(&priority)?,
        response_minutes: row.try_get("response_minutes").map_err(decode_error)?,
        resolution_minutes: row.try_get("resolution_minutes").map_err(decode_error)?,
    })
}

fn row_to_escalation_rule(row: &SqliteRow) -> Result<EscalationRule, RepositoryError> {
    let priority: String = row.try_get("priority").map_err(decode_error)?;
    let notify_users_json: String = row.try_get("notify_users_json").map_err(decode_error)?;
    let level_offsets_json: String = row.try_get("level_offsets_json").map_err(decode_error)?;
    let level_targets_json: String = row.try_get("level_targets_json").map_err(decode_error)?;
    let max_level: Option<i64> = row.try_get("max_level").map_err(decode_error)?;

    Ok(EscalationRule {
        priority: parse_priority(&priority)?,
        trigger_after_minutes: row.try_get("trigger_after_minutes").map_err(decode_error)?,
        level1_escalate: row.try_get("level1_escalate").map_err(decode_error)?,
        level2_escalate: row.try_get("level2_escalate").map_err(decode_error)?,
        notify_users: serde_json::from_str(&notify_users_json).map_err(decode_error)?,
        auto_escalate: row.try_get("auto_escalate").map_err(decode_error)?,
        level_offsets: serde_json::from_str(&level_offsets_json).map_err(decode_error)?,
        level_targets: serde_json::from_str(&level_targets_json).map_err(decode_error)?,
        max_level: max_level.map(u32::try_from).transpose().map_err(decode_error)?,
    })
}

#[cfg(test)]
mod tests {
    use supportdesk_core::domain::policy::{EscalationRule, SlaPolicy};
    use supportdesk_core::domain::ticket::Priority;
    use supportdesk_core::policy_source::PolicySource;

    use super::SqlPolicyRepository;
    use crate::{connect_with_settings, migrations};

    fn default_sla() -> SlaPolicy {
        SlaPolicy {
            id: "sla-default".to_string(),
            priority: Priority::Medium,
            response_minutes: 60,
            resolution_minutes: 1440,
        }
    }

    async fn setup() -> SqlPolicyRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlPolicyRepository::new(pool, default_sla())
    }

    #[tokio::test]
    async fn empty_tables_carry_only_the_default() {
        let repo = setup().await;

        let tables = repo.load().await.expect("load");

        assert!(tables.sla_policies.is_empty());
        assert!(tables.escalation_rules.is_empty());
        assert_eq!(tables.default_sla, default_sla());
    }

    #[tokio::test]
    async fn saved_rows_are_visible_on_next_load() {
        let repo = setup().await;
        repo.save_sla_policy(&SlaPolicy {
            id: "sla-urgent".to_string(),
            priority: Priority::Urgent,
            response_minutes: 30,
            resolution_minutes: 240,
        })
        .await
        .expect("save policy");
        repo.save_escalation_rule(&EscalationRule {
            priority: Priority::Urgent,
            trigger_after_minutes: 60,
            level1_escalate: "L1-Queue".to_string(),
            level2_escalate: "L2-Duty".to_string(),
            notify_users: vec!["ops-lead".to_string()],
            auto_escalate: true,
            level_offsets: vec![60, 90],
            level_targets: Vec::new(),
            max_level: Some(2),
        })
        .await
        .expect("save rule");

        let tables = repo.load().await.expect("load");

        let policy = tables.sla_policies.get(&Priority::Urgent).expect("urgent policy");
        assert_eq!(policy.resolution_minutes, 240);
        let rule = tables.escalation_rules.get(&Priority::Urgent).expect("urgent rule");
        assert_eq!(rule.level_offsets, vec![60, 90]);
        assert_eq!(rule.max_level, Some(2));
        assert_eq!(rule.notify_users, vec!["ops-lead".to_string()]);
    }

    #[tokio::test]
    async fn saving_same_priority_replaces_policy() {
        let repo = setup().await;
        let mut policy = SlaPolicy {
            id: "sla-high".to_string(),
            priority: Priority::High,
            response_minutes: 60,
            resolution_minutes: 480,
        };
        repo.save_sla_policy(&policy).await.expect("save");
        policy.resolution_minutes = 360;
        repo.save_sla_policy(&policy).await.expect("replace");

        let tables = repo.load().await.expect("load");

        assert_eq!(tables.sla_policies.len(), 1);
        assert_eq!(
            tables.sla_policies.get(&Priority::High).map(|policy| policy.resolution_minutes),
            Some(360)
        );
    }

    #[tokio::test]
    async fn schema_rejects_unbounded_windows_and_levels() {
        let repo = setup().await;

        let oversized_window = repo
            .save_sla_policy(&SlaPolicy {
                id: "sla-forever".to_string(),
                priority: Priority::Low,
                response_minutes: 60,
                resolution_minutes: 200_000_000_000,
            })
            .await;
        assert!(oversized_window.is_err());

        let oversized_levels = repo
            .save_escalation_rule(&EscalationRule {
                priority: Priority::Low,
                trigger_after_minutes: 60,
                level1_escalate: "L1-Queue".to_string(),
                level2_escalate: "L2-Duty".to_string(),
                notify_users: Vec::new(),
                auto_escalate: true,
                level_offsets: Vec::new(),
                level_targets: Vec::new(),
                max_level: Some(4_000_000_000),
            })
            .await;
        assert!(oversized_levels.is_err());

        let tables = repo.load().await.expect("load");
        assert!(tables.sla_policies.is_empty());
        assert!(tables.escalation_rules.is_empty());
    }
}
