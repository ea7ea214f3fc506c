use std::time;

use envconfig::Envconfig;

use bbs_common::config::DatabaseConfig;

use crate::retry::RetryPolicy;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    /// Connection attempts before giving up.
    #[envconfig(from = "RETRY_COUNT", default = "10")]
    pub retry_count: u32,

    #[envconfig(from = "RETRY_INTERVAL_SECS", default = "1")]
    pub retry_interval_secs: u64,

    #[envconfig(nested = true)]
    pub database: DatabaseConfig,
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_count,
            time::Duration::from_secs(self.retry_interval_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts(), 10);
        assert_eq!(policy.interval(), time::Duration::from_secs(1));
        assert_eq!(config.database.user, "bbs-sample-user");
    }

    #[test]
    fn overrides() {
        let env = HashMap::from([
            ("RETRY_COUNT".to_owned(), "3".to_owned()),
            ("RETRY_INTERVAL_SECS".to_owned(), "5".to_owned()),
        ]);
        let policy = Config::init_from_hashmap(&env).unwrap().retry_policy();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.interval(), time::Duration::from_secs(5));
    }
}
