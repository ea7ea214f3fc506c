use std::future::Future;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::database::{ConnectMode, ConnectionSlot, Database, DatabaseError};
use crate::health::{ComponentStatus, HealthHandle};
use crate::shutdown::ShutdownSignal;

pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Shortest period the probe timer accepts.
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_millis(1);

/// Periodic liveness probing of an established [`Database`] connection.
#[derive(Clone)]
pub struct HealthMonitor {
    interval: Duration,
    liveness: Option<HealthHandle>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_INTERVAL)
    }
}

impl HealthMonitor {
    /// Intervals shorter than [`MIN_PROBE_INTERVAL`] are raised to it.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_PROBE_INTERVAL),
            liveness: None,
        }
    }

    /// Mirror every probe outcome into a liveness component.
    pub fn with_liveness(mut self, liveness: HealthHandle) -> Self {
        self.liveness = Some(liveness);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe `db` every interval until a probe fails or `shutdown` fires.
    ///
    /// The caller is expected to have just probed, so the first probe happens one
    /// interval from now. Only returns once the connection has been released:
    /// with the failing probe's error, or with [`DatabaseError::Cancelled`] after
    /// a disconnect.
    pub async fn watch(&self, db: &dyn Database, shutdown: &ShutdownSignal) -> DatabaseError {
        self.report_healthy();

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match db.probe().await {
                Ok(()) => {
                    metrics::counter!("bbs_database_probes_total", "result" => "ok").increment(1);
                    self.report_healthy();
                }
                // The handle may have been torn down under the probe by shutdown.
                Err(_) if shutdown.is_cancelled() => break,
                Err(error) => {
                    metrics::counter!("bbs_database_probes_total", "result" => "error")
                        .increment(1);
                    self.report(ComponentStatus::Unhealthy);
                    warn!(component = "database", %error, "database health check failed");
                    if let Err(e) = db.disconnect().await {
                        debug!(error = %e, "connection already released after failed probe");
                    }
                    return error;
                }
            }
        }

        match db.disconnect().await {
            Ok(()) => info!(component = "database", "database disconnected on shutdown"),
            Err(e) => debug!(error = %e, "connection already released on shutdown"),
        }
        self.report(ComponentStatus::Unhealthy);
        DatabaseError::Cancelled
    }

    fn report_healthy(&self) {
        if let Some(liveness) = &self.liveness {
            liveness.report_healthy();
        }
    }

    fn report(&self, status: ComponentStatus) {
        if let Some(liveness) = &self.liveness {
            liveness.report_status(status);
        }
    }
}

/// Connect sequence shared by every [`Database`] implementation.
///
/// Installs `handle` into `slot`, then races the first probe against
/// `shutdown`. A failed or cancelled probe hands the handle back to `release`.
/// Once the probe passes the slot is marked verified; one-shot connections
/// return there, supervised ones stay in [`HealthMonitor::watch`] until it
/// ends and a failure is recorded as terminal.
pub(crate) async fn establish<H, R, F>(
    db: &dyn Database,
    slot: &ConnectionSlot<H>,
    handle: H,
    mode: ConnectMode,
    monitor: &HealthMonitor,
    shutdown: &ShutdownSignal,
    release: R,
) -> Result<(), DatabaseError>
where
    H: Clone + Send + Sync,
    R: FnOnce(H) -> F + Send,
    F: Future<Output = ()> + Send,
{
    slot.install(handle)?;

    let probe = tokio::select! {
        biased;

        _ = shutdown.cancelled() => Err(DatabaseError::Cancelled),
        result = db.probe() => result,
    };
    if let Err(error) = probe {
        if error.is_cancelled() {
            debug!("database connect cancelled before the first probe");
        } else {
            warn!(%error, "database is not reachable");
        }
        if let Ok(handle) = slot.take() {
            release(handle).await;
        }
        return Err(error);
    }
    slot.mark_verified();
    info!("connected to the database");

    match mode {
        ConnectMode::OneShot => Ok(()),
        ConnectMode::Supervised => {
            let error = monitor.watch(db, shutdown).await;
            if !error.is_cancelled() {
                slot.mark_failed();
            }
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_is_raised_to_the_minimum() {
        assert_eq!(HealthMonitor::new(Duration::ZERO).interval(), MIN_PROBE_INTERVAL);
        assert_eq!(
            HealthMonitor::new(Duration::from_millis(250)).interval(),
            Duration::from_millis(250)
        );
        assert_eq!(HealthMonitor::default().interval(), DEFAULT_PROBE_INTERVAL);
    }
}
