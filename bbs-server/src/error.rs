use std::io;

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;

use bbs_common::database::DatabaseError;
use bbs_common::shutdown::ShutdownReason;

/// Errors returned by [`Server::run`](crate::server::Server::run).
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("server: failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("server: failed to accept connections: {0}")]
    Accept(io::Error),
    #[error("server: already started")]
    AlreadyStarted,
    #[error("server: cancelled")]
    Cancelled,
}

impl ServerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServerError::Cancelled)
    }
}

/// Why [`App::run`](crate::app::App::run) returned.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("component '{component}' exited unexpectedly")]
    ComponentExited { component: &'static str },
    #[error("component '{component}' panicked")]
    ComponentPanicked { component: &'static str },
    #[error("shutdown: {0}")]
    Shutdown(ShutdownReason),
    #[error("failed to install the metrics recorder: {0}")]
    Metrics(#[from] BuildError),
}

impl LifecycleError {
    /// True when the process stopped because an OS signal asked it to.
    pub fn is_clean_shutdown(&self) -> bool {
        matches!(self, LifecycleError::Shutdown(ShutdownReason::Signal(_)))
    }
}
