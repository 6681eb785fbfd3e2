//! Escalation thresholds derived from the priority-keyed rule table.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::policy::{EscalationRule, PolicyTables};
use crate::domain::ticket::Priority;
use crate::errors::EngineIssue;

pub const DEFAULT_MAX_LEVEL: u32 = 3;
/// Hard ceiling on the number of levels any rule may define.
pub const MAX_ESCALATION_LEVEL: u32 = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationThreshold {
    pub level: u32,
    /// Minutes after `ticket.created_at` at which this level fires.
    pub after_minutes: i64,
    pub escalate_to: String,
    pub notify_users: Vec<String>,
}

impl EscalationThreshold {
    pub fn is_reached(&self, elapsed: Duration) -> bool {
        Duration::try_minutes(self.after_minutes).is_some_and(|after| elapsed >= after)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EscalationRuleMatcher {
    default_max_level: u32,
}

impl Default for EscalationRuleMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LEVEL)
    }
}

impl EscalationRuleMatcher {
    pub fn new(default_max_level: u32) -> Self {
        Self { default_max_level: default_max_level.clamp(1, MAX_ESCALATION_LEVEL) }
    }

    /// Ordered thresholds for `priority`, level 1 first, strictly ascending in `after_minutes`.
    ///
    /// Empty when no rule exists or its explicit offsets are not strictly ascending (both
    /// reported as an issue), or when the rule is manual-only. Derived levels past the
    /// explicit offsets stop at the first one that would not fire after its predecessor.
    pub fn thresholds(
        &self,
        priority: Priority,
        tables: &PolicyTables,
    ) -> (Vec<EscalationThreshold>, Option<EngineIssue>) {
        let Some(rule) = tables.escalation_rules.get(&priority) else {
            return (Vec::new(), Some(EngineIssue::MissingEscalationRule { priority }));
        };

        if !rule.auto_escalate {
            return (Vec::new(), None);
        }

        if rule.trigger_after_minutes <= 0 && rule.level_offsets.is_empty() {
            warn!(
                event_name = "engine.policy.invalid_rule",
                priority = priority.as_str(),
                trigger_after_minutes = rule.trigger_after_minutes,
                "escalation rule has no positive trigger; ignoring"
            );
            return (Vec::new(), None);
        }

        if let Err(message) = check_offsets(&rule.level_offsets) {
            warn!(
                event_name = "engine.policy.invalid_rule",
                priority = priority.as_str(),
                offsets = ?rule.level_offsets,
                reason = %message,
                "escalation rule offsets rejected"
            );
            return (Vec::new(), Some(EngineIssue::InvalidEscalationRule { priority, message }));
        }

        let max_level = self.max_level(rule);
        let mut thresholds: Vec<EscalationThreshold> = Vec::with_capacity(max_level as usize);
        for level in 1..=max_level {
            let after = after_minutes(rule, level);
            if thresholds.last().is_some_and(|previous| after <= previous.after_minutes)
                || after <= 0
            {
                break;
            }
            thresholds.push(EscalationThreshold {
                level,
                after_minutes: after,
                escalate_to: escalate_to(rule, level),
                notify_users: rule.notify_users.clone(),
            });
        }

        (thresholds, None)
    }

    fn max_level(&self, rule: &EscalationRule) -> u32 {
        let level = match rule.max_level {
            Some(max_level) => max_level,
            None => {
                let explicit = rule.level_offsets.len().max(rule.level_targets.len());
                let explicit = u32::try_from(explicit).unwrap_or(u32::MAX);
                self.default_max_level.max(explicit)
            }
        };
        level.min(MAX_ESCALATION_LEVEL)
    }
}

fn check_offsets(offsets: &[i64]) -> Result<(), String> {
    if offsets.iter().any(|offset| *offset <= 0) {
        return Err("level offsets must be positive".to_string());
    }
    if offsets.windows(2).any(|pair| pair[1] <= pair[0]) {
        return Err("level offsets must be strictly ascending".to_string());
    }
    Ok(())
}

fn after_minutes(rule: &EscalationRule, level: u32) -> i64 {
    rule.level_offsets
        .get(level as usize - 1)
        .copied()
        .unwrap_or_else(|| rule.trigger_after_minutes.saturating_mul(i64::from(level)))
}

fn escalate_to(rule: &EscalationRule, level: u32) -> String {
    if let Some(target) = rule.level_targets.get(level as usize - 1) {
        return target.clone();
    }

    match level {
        1 => rule.level1_escalate.clone(),
        // Levels past 2 repeat the level 2 target.
        _ => rule.level2_escalate.clone(),
    }
}

/// Highest threshold reached once `elapsed` has passed since creation.
pub fn highest_reached(
    thresholds: &[EscalationThreshold],
    elapsed: Duration,
) -> Option<&EscalationThreshold> {
    thresholds
        .iter()
        .filter(|threshold| threshold.is_reached(elapsed))
        .max_by_key(|threshold| threshold.level)
}
