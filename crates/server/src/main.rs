mod bootstrap;
mod health;
mod pipeline;
mod sweeper;

use std::time::Duration;

use anyhow::Result;
use pesto_core::config::{AppConfig, LoadOptions};

use crate::health::HealthState;

fn init_logging(config: &AppConfig) {
    use pesto_core::config::LogFormat::*;
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

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        HealthState::new(app.db_pool.clone(), app.cooldowns.clone()),
    )
    .await?;

    let sweeper = sweeper::spawn(app.cooldowns.clone(), app.config.tagging.sweep_interval());

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "pesto-server started"
    );

    tokio::select! {
        result = app.slack_runner.start() => {
            if let Err(error) = result {
                tracing::error!(
                    event_name = "system.server.runner_failed",
                    correlation_id = "shutdown",
                    error = %error,
                    "slack runner stopped with an error"
                );
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
        }
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "pesto-server stopping"
    );
    sweeper.abort();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            "database pool did not close within the grace period"
        );
    }

    Ok(())
}
