use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

use crate::database::{ConnectMode, ConnectionOptions};

#[derive(Envconfig, Clone)]
pub struct DatabaseConfig {
    #[envconfig(from = "DATABASE_ADDR", default = "localhost:5432")]
    pub addr: String,

    #[envconfig(from = "DATABASE_NAME", default = "bbs-sample")]
    pub name: String,

    #[envconfig(from = "DATABASE_USER", default = "bbs-sample-user")]
    pub user: String,

    #[envconfig(from = "DATABASE_PASSWORD", default = "bbs-sample-password")]
    pub password: String,

    #[envconfig(from = "DATABASE_CONNECT_MODE", default = "supervised")]
    pub connect_mode: ConnectMode,

    #[envconfig(from = "DATABASE_PROBE_INTERVAL_MS", default = "10000")]
    pub probe_interval: EnvMsInterval,

    #[envconfig(from = "DATABASE_ACQUIRE_TIMEOUT_MS", default = "5000")]
    pub acquire_timeout: EnvMsDuration,

    #[envconfig(from = "DATABASE_MAX_CONNECTIONS", default = "5")]
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn options(&self) -> ConnectionOptions {
        ConnectionOptions {
            addr: self.addr.clone(),
            name: self.name.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl std::fmt::Display for ParseEnvMsDurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected a duration in milliseconds")
    }
}

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

/// Like [`EnvMsDuration`], but zero is refused: a timer period has to advance.
#[derive(Debug, Clone, Copy)]
pub struct EnvMsInterval(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsIntervalError;

impl std::fmt::Display for ParseEnvMsIntervalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected a non-zero duration in milliseconds")
    }
}

impl FromStr for EnvMsInterval {
    type Err = ParseEnvMsIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<EnvMsDuration>() {
            Ok(EnvMsDuration(duration)) if !duration.is_zero() => Ok(EnvMsInterval(duration)),
            _ => Err(ParseEnvMsIntervalError),
        }
    }
}
