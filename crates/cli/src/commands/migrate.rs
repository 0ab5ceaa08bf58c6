use pesto_core::config::{AppConfig, LoadOptions};
use pesto_db::{connect_with_config, migrations};

use crate::commands::{block_on, CommandResult};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let result = block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let applied = migrations::applied_versions(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(applied)
    });

    match result {
        Ok(Ok(applied)) => CommandResult::success(
            "migrate",
            format!("applied pending migrations; schema at {} version(s)", applied.len()),
        ),
        Ok(Err((error_class, message, exit_code))) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
        Err(error) => CommandResult::failure(
            "migrate",
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        ),
    }
}
