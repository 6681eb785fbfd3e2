use std::sync::Arc;
use std::time::Duration;

use supportdesk_core::clock::SystemClock;
use supportdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use supportdesk_core::engine::EscalationEngine;
use supportdesk_core::notification::LoggingNotificationPort;
use supportdesk_core::tickets::TicketService;
use supportdesk_db::{
    connect_with_settings, migrations, DbPool, SqlPolicyRepository, SqlSweepLease, SqlTicketStore,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::notifier::{QueuedNotifier, RetryPolicy, RetryingNotifier, DELIVERY_QUEUE_CAPACITY};
use crate::scheduler::SweepScheduler;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub tickets: Arc<TicketService>,
    pub engine: Arc<EscalationEngine>,
    pub scheduler: SweepScheduler,
    /// Background notification delivery; ends once the engine is dropped.
    pub delivery: JoinHandle<()>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let store = Arc::new(SqlTicketStore::new(db_pool.clone()));
    let policies = Arc::new(SqlPolicyRepository::new(db_pool.clone(), config.sla.default_policy()));
    let clock = Arc::new(SystemClock);
    let retrying = Arc::new(RetryingNotifier::new(
        Arc::new(LoggingNotificationPort),
        RetryPolicy::from_config(&config.notification),
    ));
    let (queued, worker) = QueuedNotifier::channel(retrying, DELIVERY_QUEUE_CAPACITY);
    let delivery = tokio::spawn(worker.run());
    let notifier = Arc::new(queued);

    let engine = Arc::new(
        EscalationEngine::with_config(
            store.clone(),
            policies.clone(),
            notifier,
            clock.clone(),
            config.sweep.engine_config(),
        )
        .with_lease(Arc::new(SqlSweepLease::new(db_pool.clone()))),
    );
    let tickets = Arc::new(
        TicketService::new(store, policies, clock)
            .with_conflict_retries(config.sweep.conflict_retries),
    );
    let scheduler =
        SweepScheduler::new(engine.clone(), Duration::from_secs(config.sweep.interval_secs));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        sweep_interval_secs = config.sweep.interval_secs,
        soft_deadline_secs = config.sweep.soft_deadline_secs,
        "escalation engine wired"
    );

    Ok(Application { config, db_pool, tickets, engine, scheduler, delivery })
}
