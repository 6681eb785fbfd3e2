use std::sync::Arc;

use supportdesk_core::clock::SystemClock;
use supportdesk_core::engine::{EscalationEngine, SweepReport};
use supportdesk_core::notification::LoggingNotificationPort;
use supportdesk_db::{SqlPolicyRepository, SqlSweepLease, SqlTicketStore};

use crate::commands::{load_config, open_migrated_pool, runtime, CommandFailure, CommandResult};

/// Runs a single escalation sweep against the configured database and prints its report.
///
/// Shares the database sweep lease with the server scheduler: while a server sweep is in
/// flight this reports a skipped sweep instead of running a second one.
pub fn run() -> CommandResult {
    let config = match load_config("sweep") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("sweep") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result: Result<SweepReport, CommandFailure> = runtime.block_on(async {
        let pool = open_migrated_pool(&config).await?;

        let engine = EscalationEngine::with_config(
            Arc::new(SqlTicketStore::new(pool.clone())),
            Arc::new(SqlPolicyRepository::new(pool.clone(), config.sla.default_policy())),
            Arc::new(LoggingNotificationPort),
            Arc::new(SystemClock),
            config.sweep.engine_config(),
        )
        .with_lease(Arc::new(SqlSweepLease::new(pool.clone())));
        let report = engine.sweep().await;

        pool.close().await;
        Ok(report)
    });

    match result {
        Ok(report) => CommandResult::report("sweep", &report),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sweep", error_class, message, exit_code)
        }
    }
}
