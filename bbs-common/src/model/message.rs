use std::sync::Arc;

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::database::{Database, DatabaseError, Row};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub message: String,
    pub created_at: String,
}

impl Message {
    fn from_row(row: &Row) -> Result<Self, DatabaseError> {
        Ok(Self {
            id: row.get_i64("id")?,
            user_id: row.get_i64("user_id")?,
            user_name: row.get_string("user_name")?,
            message: row.get_string("message")?,
            created_at: row.get_string("created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub user_id: i64,
    pub message: String,
}

#[derive(Clone)]
pub struct MessageModel {
    db: Arc<dyn Database>,
}

impl MessageModel {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// All messages, oldest first, with the author's name.
    pub async fn find_all(&self) -> Result<Vec<Message>, DatabaseError> {
        let rows = self
            .db
            .query(
                r#"
SELECT m.id, m.user_id, u.name AS user_name, m.message, m.created_at::text AS created_at
FROM messages m
INNER JOIN users u ON m.user_id = u.id
ORDER BY m.id
                "#,
                &[],
            )
            .await?;

        rows.iter().map(Message::from_row).collect()
    }

    /// Store a message stamped with the current time.
    pub async fn save(&self, message: &NewMessage) -> Result<(), DatabaseError> {
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|error| DatabaseError::Transport(sqlx::Error::Encode(error.into())))?;

        self.db
            .execute(
                "INSERT INTO messages (user_id, message, created_at) VALUES ($1, $2, $3::timestamptz)",
                &[
                    message.user_id.into(),
                    message.message.as_str().into(),
                    created_at.into(),
                ],
            )
            .await?;
        Ok(())
    }
}
