//! Process-wide shutdown signal and OS signal translation.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{info, warn};

/// Why the process is shutting down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT or SIGTERM was received.
    Signal(String),
    /// A component reported a fatal error.
    Failure { component: String, reason: String },
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "received {name}"),
            ShutdownReason::Failure { component, reason } => {
                write!(f, "component '{component}' failed: {reason}")
            }
        }
    }
}

/// Broadcast, one-shot "done" signal shared by every task of the process.
///
/// Triggering is idempotent: all clones observe the first trigger, and only the
/// first reason is kept.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<ShutdownReason>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns true if this call was the one that set the reason.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        // The reason must be visible before any waiter wakes up.
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    /// Future that resolves once the signal has fired. Use in `tokio::select!`.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason recorded by the first trigger, if any.
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().cloned()
    }
}

/// Wait for SIGINT or SIGTERM and return the name of the signal received.
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    let mut term = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    let name = tokio::select! {
        _ = term.recv() => "SIGTERM",
        _ = interrupt.recv() => "SIGINT",
    };
    Ok(name)
}

/// Spawn the task translating OS signals into `shutdown`. The task also ends when
/// `shutdown` fires for another reason, so it never outlives the run loop.
pub fn spawn_signal_handler(shutdown: ShutdownSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = wait_for_signal() => match result {
                Ok(name) => {
                    info!(signal = name, "got signal, shutting down");
                    shutdown.trigger(ShutdownReason::Signal(name.to_owned()));
                }
                Err(error) => {
                    warn!(%error, "failed to install signal handlers");
                }
            },
            _ = shutdown.cancelled() => {}
        }
    })
}
