use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::ticket::Priority;

/// Longest resolution window a policy may carry: ten years.
pub const MAX_RESOLUTION_MINUTES: i64 = 10 * 365 * 24 * 60;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaPolicy {
    pub id: String,
    pub priority: Priority,
    pub response_minutes: i64,
    pub resolution_minutes: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub priority: Priority,
    pub trigger_after_minutes: i64,
    pub level1_escalate: String,
    pub level2_escalate: String,
    #[serde(default)]
    pub notify_users: Vec<String>,
    pub auto_escalate: bool,
    /// Explicit minute offsets per level, index 0 is level 1. Overrides `trigger_after * n`.
    #[serde(default)]
    pub level_offsets: Vec<i64>,
    /// Explicit targets per level, index 0 is level 1.
    #[serde(default)]
    pub level_targets: Vec<String>,
    #[serde(default)]
    pub max_level: Option<u32>,
}

/// Point-in-time snapshot of the SLA policy and escalation rule tables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyTables {
    pub sla_policies: HashMap<Priority, SlaPolicy>,
    pub escalation_rules: HashMap<Priority, EscalationRule>,
    pub default_sla: SlaPolicy,
}

impl PolicyTables {
    pub fn new(default_sla: SlaPolicy) -> Self {
        Self { sla_policies: HashMap::new(), escalation_rules: HashMap::new(), default_sla }
    }

    pub fn with_sla_policy(mut self, policy: SlaPolicy) -> Self {
        self.sla_policies.insert(policy.priority, policy);
        self
    }

    pub fn with_escalation_rule(mut self, rule: EscalationRule) -> Self {
        self.escalation_rules.insert(rule.priority, rule);
        self
    }
}
