use std::sync::Arc;

use serde::Serialize;

use crate::database::{Database, DatabaseError, Row};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl User {
    fn from_row(row: &Row) -> Result<Self, DatabaseError> {
        Ok(Self {
            id: row.get_i64("id")?,
            name: row.get_string("name")?,
            email: row.get_string("email")?,
        })
    }
}

/// A user about to be stored. `password_hash` is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Clone)]
pub struct UserModel {
    db: Arc<dyn Database>,
}

impl UserModel {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Look a user up by credentials.
    pub async fn find(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<User>, DatabaseError> {
        let rows = self
            .db
            .query(
                r#"
SELECT id, name, email FROM users
WHERE email = $1
AND password_hash = $2
LIMIT 1
                "#,
                &[email.into(), password_hash.into()],
            )
            .await?;

        rows.first().map(User::from_row).transpose()
    }

    pub async fn find_all(&self) -> Result<Vec<User>, DatabaseError> {
        let rows = self
            .db
            .query("SELECT id, name, email FROM users ORDER BY id", &[])
            .await?;

        rows.iter().map(User::from_row).collect()
    }

    pub async fn save(&self, user: &NewUser) -> Result<(), DatabaseError> {
        self.db
            .execute(
                "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3)",
                &[
                    user.name.as_str().into(),
                    user.email.as_str().into(),
                    user.password_hash.as_str().into(),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn exists(&self, email: &str) -> Result<bool, DatabaseError> {
        let rows = self
            .db
            .query("SELECT id FROM users WHERE email = $1 LIMIT 1", &[email.into()])
            .await?;
        Ok(!rows.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Value;
    use crate::test_utils::MemoryDatabase;

    fn alice() -> Row {
        Row::new()
            .with("id", 1)
            .with("name", "alice")
            .with("email", "alice@example.com")
    }

    #[tokio::test]
    async fn find_binds_credentials() {
        let db = Arc::new(MemoryDatabase::connected());
        db.push_rows(vec![alice()]);
        let users = UserModel::new(db.clone());

        let user = users.find("alice@example.com", "digest").await.unwrap();
        assert_eq!(user.map(|u| u.name), Some("alice".to_owned()));

        let statements = db.statements();
        assert_eq!(
            statements[0].args,
            vec![Value::from("alice@example.com"), Value::from("digest")]
        );
    }

    #[tokio::test]
    async fn find_unknown_user() {
        let db = Arc::new(MemoryDatabase::connected());
        let users = UserModel::new(db);

        assert_eq!(users.find("nobody@example.com", "x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn find_all_decodes_every_row() {
        let db = Arc::new(MemoryDatabase::connected());
        db.push_rows(vec![
            alice(),
            Row::new()
                .with("id", 2)
                .with("name", "bob")
                .with("email", "bob@example.com"),
        ]);
        let users = UserModel::new(db).find_all().await.unwrap();

        assert_eq!(users.len(), 2);
        assert_eq!(users[1].id, 2);
    }

    #[tokio::test]
    async fn malformed_row_is_a_decode_error() {
        let db = Arc::new(MemoryDatabase::connected());
        db.push_rows(vec![Row::new().with("id", "one")]);

        let err = UserModel::new(db).find_all().await.unwrap_err();
        assert!(matches!(err, DatabaseError::Decode { .. }));
    }

    #[tokio::test]
    async fn save_and_exists() {
        let db = Arc::new(MemoryDatabase::connected());
        let users = UserModel::new(db.clone());

        users
            .save(&NewUser {
                name: "alice".to_owned(),
                email: "alice@example.com".to_owned(),
                password_hash: "digest".to_owned(),
            })
            .await
            .unwrap();
        assert!(!users.exists("alice@example.com").await.unwrap());

        db.push_rows(vec![Row::new().with("id", 1)]);
        assert!(users.exists("alice@example.com").await.unwrap());

        let statements = db.statements();
        assert!(statements[0].statement.starts_with("INSERT INTO users"));
        assert_eq!(statements[0].args.len(), 3);
    }

    #[tokio::test]
    async fn store_errors_propagate() {
        let db = Arc::new(crate::test_utils::MemoryDatabase::new(
            crate::database::ConnectMode::OneShot,
        ));
        let err = UserModel::new(db).find_all().await.unwrap_err();
        assert!(matches!(err, DatabaseError::ConnectionNotEstablished));
    }
}
