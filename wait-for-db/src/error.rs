use bbs_common::database::DatabaseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WaitError {
    #[error("database still unavailable after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last_error: Option<DatabaseError>,
    },
    #[error("wait for database cancelled")]
    Cancelled,
}
