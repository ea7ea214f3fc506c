//! Top-level run loop: starts the store connection and the listener side by
//! side and tears both down as soon as either fails or a signal arrives.

use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use bbs_common::database::{Database, DatabaseError};
use bbs_common::health::HealthRegistry;
use bbs_common::metrics::setup_metrics_routes;
use bbs_common::postgres::PgDatabase;
use bbs_common::shutdown::{spawn_signal_handler, ShutdownReason, ShutdownSignal};
use bbs_common::supervision::HealthMonitor;

use crate::config::Config;
use crate::error::{LifecycleError, ServerError};
use crate::handlers::{self, AppState};
use crate::server::{Server, ServerOptions};

const DATABASE: &str = "database";
const SERVER: &str = "server";

/// Liveness deadline, in probe intervals.
const LIVENESS_INTERVALS: u32 = 3;

pub struct App {
    db: Arc<dyn Database>,
    server: Arc<Server>,
    monitor: HealthMonitor,
    shutdown: ShutdownSignal,
    trap_signals: bool,
}

enum Finished {
    Shutdown,
    Database(LifecycleError),
    Server(LifecycleError),
}

impl App {
    /// Wire the Postgres store, the router and the listener from `config`. OS
    /// signals are trapped.
    pub fn new(config: &Config) -> Result<Self, LifecycleError> {
        if config.app_secret.len() != 32 {
            warn!("APP_SECRET should be 32 bytes long");
        }

        let shutdown = ShutdownSignal::new();
        let liveness = HealthRegistry::new("liveness");

        let interval = config.database.probe_interval.0;
        let deadline = time::Duration::try_from(interval.saturating_mul(LIVENESS_INTERVALS))
            .unwrap_or(time::Duration::MAX);
        let monitor =
            HealthMonitor::new(interval).with_liveness(liveness.register(DATABASE, deadline));

        let db = PgDatabase::new(
            &config.database.options(),
            config.database.connect_mode,
            monitor.clone(),
        )?
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout.0);
        let db: Arc<dyn Database> = Arc::new(db);

        let router = handlers::router(AppState::new(db.clone(), liveness, shutdown.clone()));
        let router = if config.export_prometheus {
            setup_metrics_routes(router)?
        } else {
            router
        };

        let server = Server::new(
            ServerOptions {
                addr: config.bind(),
                shutdown_timeout: config.shutdown_timeout.0,
            },
            router,
        );

        Ok(Self::from_parts(db, server, monitor, shutdown).trap_signals(true))
    }

    /// Assemble an app from ready-made parts. Signals are not trapped.
    pub fn from_parts(
        db: Arc<dyn Database>,
        server: Server,
        monitor: HealthMonitor,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            db,
            server: Arc::new(server),
            monitor,
            shutdown,
            trap_signals: false,
        }
    }

    pub fn trap_signals(mut self, trap_signals: bool) -> Self {
        self.trap_signals = trap_signals;
        self
    }

    /// Fire this to stop [`App::run`] from outside.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn server(&self) -> Arc<Server> {
        self.server.clone()
    }

    pub fn database(&self) -> Arc<dyn Database> {
        self.db.clone()
    }

    /// Run until a signal, a store failure or a listener failure, then wait for
    /// both subsystems to release their resources.
    ///
    /// Never returns `Ok`: a requested shutdown is reported as
    /// [`LifecycleError::Shutdown`], anything else as the error that started it.
    pub async fn run(self) -> Result<(), LifecycleError> {
        let signals = self
            .trap_signals
            .then(|| spawn_signal_handler(self.shutdown.clone()));

        let mut database = tokio::spawn(run_database(
            self.db.clone(),
            self.monitor.clone(),
            self.shutdown.clone(),
        ));
        let mut server = {
            let server = self.server.clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move { server.run(&shutdown).await })
        };

        let finished = tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => Finished::Shutdown,
            joined = &mut database => Finished::Database(outcome(DATABASE, joined)),
            joined = &mut server => Finished::Server(outcome(SERVER, joined)),
        };

        let failure = match finished {
            Finished::Shutdown => {
                info!("shutdown requested, stopping subsystems");
                drain(DATABASE, database).await;
                drain(SERVER, server).await;
                None
            }
            Finished::Database(error) => {
                self.fail(DATABASE, &error);
                drain(SERVER, server).await;
                Some(error)
            }
            Finished::Server(error) => {
                self.fail(SERVER, &error);
                drain(DATABASE, database).await;
                Some(error)
            }
        };

        if let Some(signals) = signals {
            if let Err(e) = signals.await {
                warn!("signal handler task failed: {}", e);
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Err(LifecycleError::Shutdown(self.shutdown.reason().unwrap_or_else(
                || ShutdownReason::Failure {
                    component: "lifecycle".to_owned(),
                    reason: "shutdown without a reason".to_owned(),
                },
            ))),
        }
    }

    fn fail(&self, component: &'static str, error: &LifecycleError) {
        error!(component, error = %error, "component failed, shutting down");
        self.shutdown.trigger(ShutdownReason::Failure {
            component: component.to_owned(),
            reason: error.to_string(),
        });
    }
}

/// Connect, then keep probing. A one-shot connect returns after its first probe,
/// so supervision continues here; a supervised connect only returns once it is
/// over.
async fn run_database(
    db: Arc<dyn Database>,
    monitor: HealthMonitor,
    shutdown: ShutdownSignal,
) -> Result<(), DatabaseError> {
    db.connect(&shutdown).await?;
    Err(monitor.watch(db.as_ref(), &shutdown).await)
}

fn outcome<E>(component: &'static str, joined: Result<Result<(), E>, JoinError>) -> LifecycleError
where
    E: Into<LifecycleError>,
{
    match joined {
        Ok(Ok(())) => LifecycleError::ComponentExited { component },
        Ok(Err(error)) => error.into(),
        Err(e) => {
            error!(component, "task failed: {}", e);
            LifecycleError::ComponentPanicked { component }
        }
    }
}

/// Wait for a subsystem that was asked to stop.
async fn drain<E>(component: &'static str, task: JoinHandle<Result<(), E>>)
where
    E: Into<LifecycleError>,
{
    match outcome(component, task.await) {
        LifecycleError::Database(DatabaseError::Cancelled)
        | LifecycleError::Server(ServerError::Cancelled) => {
            debug!(component, "stopped");
        }
        error => warn!(component, error = %error, "stopped with an error"),
    }
}
