use serde::Serialize;
use supportdesk_core::config::{AppConfig, LoadOptions};
use supportdesk_core::domain::policy::PolicyTables;
use supportdesk_core::domain::ticket::Priority;
use supportdesk_core::policy_source::PolicySource;
use supportdesk_db::{connect_with_settings, SqlPolicyRepository};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: format!(
                    "configuration loaded; sweep every {}s with {}s soft deadline",
                    config.sweep.interval_secs, config.sweep.soft_deadline_secs
                ),
            });
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["database_connectivity", "policy_coverage"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Connectivity plus a read of the policy tables. Never migrates.
fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck {
                        name: "policy_coverage",
                        status: CheckStatus::Skipped,
                        details: "skipped because the database is unreachable".to_string(),
                    },
                ];
            }
        };

        let connectivity = DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        };
        let coverage =
            match SqlPolicyRepository::new(pool.clone(), config.sla.default_policy()).load().await {
                Ok(tables) => policy_coverage(&tables),
                Err(error) => DoctorCheck {
                    name: "policy_coverage",
                    status: CheckStatus::Fail,
                    details: format!("policy tables unreadable (run `supportdesk migrate`): {error}"),
                },
            };

        pool.close().await;
        vec![connectivity, coverage]
    })
}

fn policy_coverage(tables: &PolicyTables) -> DoctorCheck {
    let missing_sla = Priority::ALL
        .iter()
        .filter(|priority| !tables.sla_policies.contains_key(*priority))
        .map(|priority| priority.as_str())
        .collect::<Vec<_>>();
    let missing_rules = Priority::ALL
        .iter()
        .filter(|priority| !tables.escalation_rules.contains_key(*priority))
        .map(|priority| priority.as_str())
        .collect::<Vec<_>>();

    if missing_sla.is_empty() && missing_rules.is_empty() {
        return DoctorCheck {
            name: "policy_coverage",
            status: CheckStatus::Pass,
            details: "every priority has an sla policy and an escalation rule".to_string(),
        };
    }

    let mut gaps = Vec::new();
    if !missing_sla.is_empty() {
        gaps.push(format!(
            "no sla policy for [{}] (default `{}` applies)",
            missing_sla.join(", "),
            tables.default_sla.id
        ));
    }
    if !missing_rules.is_empty() {
        gaps.push(format!("no escalation rule for [{}]", missing_rules.join(", ")));
    }
    DoctorCheck { name: "policy_coverage", status: CheckStatus::Warn, details: gaps.join("; ") }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
