mod api;
mod bootstrap;
mod health;
mod notifier;
mod scheduler;

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use supportdesk_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;
use tracing::{error, info, warn};

fn init_logging(config: &AppConfig) {
    use supportdesk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let router = Router::new()
        .merge(api::router(api::ApiState::new(app.tickets.clone())))
        .merge(health::router(health::HealthState {
            db_pool: app.db_pool.clone(),
            scheduler: app.scheduler.status_handle(),
        }));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.health_check_port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.http.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "ticket api and health endpoint listening"
    );

    let mut http_shutdown = shutdown_rx.clone();
    let http = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(error) = result {
            error!(
                event_name = "system.http.error",
                correlation_id = "bootstrap",
                error = %error,
                "http server terminated unexpectedly"
            );
        }
    });

    let sweeps = tokio::spawn(app.scheduler.clone().run(shutdown_rx));

    info!(event_name = "system.server.started", correlation_id = "bootstrap", "supportdesk-server started");
    tokio::signal::ctrl_c().await?;
    info!(event_name = "system.server.stopping", correlation_id = "shutdown", "supportdesk-server stopping");

    let _ = shutdown_tx.send(true);
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let drained = tokio::time::timeout(grace, async {
        let _ = sweeps.await;
        let _ = http.await;
    })
    .await;
    if drained.is_err() {
        warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "shutdown grace period elapsed with work still in flight"
        );
    }

    // Undelivered queued events are dropped.
    app.delivery.abort();
    app.db_pool.close().await;
    Ok(())
}
