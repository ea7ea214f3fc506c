use std::time;

use tracing::{info, warn};

use bbs_common::database::Database;
use bbs_common::shutdown::ShutdownSignal;

use crate::error::WaitError;

#[derive(Copy, Clone, Debug)]
/// Fixed-interval retries, bounded by a number of attempts.
pub struct RetryPolicy {
    max_attempts: u32,
    interval: time::Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: time::Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval(&self) -> time::Duration {
        self.interval
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: time::Duration::from_secs(1),
        }
    }
}

/// Try to connect until the store answers a probe, then disconnect again.
///
/// `db` must connect in one-shot mode, a supervised connect would never return
/// on success. Returns the number of attempts it took.
pub async fn wait_for_database(
    db: &dyn Database,
    policy: RetryPolicy,
    shutdown: &ShutdownSignal,
) -> Result<u32, WaitError> {
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match db.connect(shutdown).await {
            Ok(()) => {
                info!(attempt, "database is available");
                if let Err(error) = db.disconnect().await {
                    warn!(%error, "failed to disconnect after the database answered");
                }
                return Ok(attempt);
            }
            Err(error) if error.is_cancelled() => {
                info!("wait for database cancelled");
                return Err(WaitError::Cancelled);
            }
            Err(error) => {
                info!(attempt, %error, "waiting for database ...");
                last_error = Some(error);
            }
        }

        if attempt == policy.max_attempts {
            break;
        }

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("wait for database cancelled");
                return Err(WaitError::Cancelled);
            }
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }

    Err(WaitError::RetriesExhausted {
        attempts: policy.max_attempts,
        last_error,
    })
}
