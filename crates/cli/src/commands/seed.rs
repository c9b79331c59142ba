use budgetflow_core::config::{AppConfig, LoadOptions};
use budgetflow_db::fixtures::{seed_minimal, seed_summary, SeedSummary};
use budgetflow_db::{connect_with_settings, migrations};

use crate::commands::{
    block_on, CommandResult, EXIT_CONFIG, EXIT_DATABASE, EXIT_MIGRATION, EXIT_RUNTIME, EXIT_SEED,
};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let result = block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        seed_minimal(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_SEED))?;

        let summary = seed_summary(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_SEED))?;

        pool.close().await;

        if summary.accounts == 0 || summary.departments == 0 || summary.policy_rows == 0 {
            return Err((
                "seed_verification",
                "seeded tables are unexpectedly empty".to_string(),
                EXIT_SEED,
            ));
        }
        Ok::<SeedSummary, (&'static str, String, u8)>(summary)
    });

    match result {
        Ok(Ok(summary)) => CommandResult::success(
            "seed",
            format!(
                "demo dataset loaded: {} accounts, {} departments, {} approval ladder rows",
                summary.accounts, summary.departments, summary.policy_rows
            ),
        ),
        Ok(Err((error_class, message, exit_code))) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
        Err(error) => CommandResult::failure(
            "seed",
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        ),
    }
}
