pub mod config;
pub mod database;
pub mod health;
pub mod metrics;
pub mod model;
pub mod password;
pub mod postgres;
pub mod shutdown;
pub mod supervision;
pub mod test_utils;
