use envconfig::Envconfig;

use bbs_common::config::{DatabaseConfig, EnvMsDuration};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8080")]
    pub port: u16,

    /// Cookie signing secret. Sessions are not served yet, so it is only validated.
    #[envconfig(from = "APP_SECRET", default = "")]
    pub app_secret: String,

    #[envconfig(from = "SHUTDOWN_TIMEOUT_MS", default = "10000")]
    pub shutdown_timeout: EnvMsDuration,

    #[envconfig(from = "EXPORT_PROMETHEUS", default = "true")]
    pub export_prometheus: bool,

    #[envconfig(nested = true)]
    pub database: DatabaseConfig,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
