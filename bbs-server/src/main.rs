//! Serve the bulletin board until a signal or a fatal error.
use std::process::ExitCode;

use envconfig::Envconfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bbs_server::app::App;
use bbs_server::config::Config;

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

    let app = match App::new(&config) {
        Ok(app) => app,
        Err(e) => {
            error!("failed to start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match app.run().await {
        Err(e) if e.is_clean_shutdown() => {
            info!("{}", e);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("bbs-server stopped: {}", e);
            ExitCode::FAILURE
        }
        Ok(()) => ExitCode::SUCCESS,
    }
}
