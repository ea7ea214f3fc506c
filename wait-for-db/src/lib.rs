//! Block until the store answers, for use before starting the server.

pub mod config;
pub mod error;
pub mod retry;
