//! Exit 0 once the database answers, 1 when retries run out.
use std::process::ExitCode;

use envconfig::Envconfig;
use tracing::error;
use tracing_subscriber::EnvFilter;

use bbs_common::database::ConnectMode;
use bbs_common::postgres::PgDatabase;
use bbs_common::shutdown::{spawn_signal_handler, ShutdownSignal};
use bbs_common::supervision::HealthMonitor;
use wait_for_db::config::Config;
use wait_for_db::error::WaitError;
use wait_for_db::retry::wait_for_database;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::init_from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let filter = match EnvFilter::try_new(&config.log_level) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("invalid LOG_LEVEL {:?}: {e}", config.log_level);
            return ExitCode::FAILURE;
        }
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db = match PgDatabase::new(
        &config.database.options(),
        ConnectMode::OneShot,
        HealthMonitor::default(),
    ) {
        Ok(db) => db
            .max_connections(1)
            .acquire_timeout(config.database.acquire_timeout.0),
        Err(e) => {
            error!("invalid database options: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = ShutdownSignal::new();
    let signals = spawn_signal_handler(shutdown.clone());

    let result = wait_for_database(&db, config.retry_policy(), &shutdown).await;
    signals.abort();

    match result {
        Ok(_) | Err(WaitError::Cancelled) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "used up retries connecting to the database");
            ExitCode::FAILURE
        }
    }
}
