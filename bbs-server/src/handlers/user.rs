use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::Deserialize;
use tracing::info;

use bbs_common::model::{NewUser, User};
use bbs_common::password::hash_password;

use super::{found, is_delete, ApiError, AppState};

#[derive(Deserialize, Debug)]
pub struct SignInForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(rename = "_method")]
    method: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct SignUpForm {
    name: String,
    email: String,
    password: String,
    confirm: String,
}

pub async fn sign_in(
    State(state): State<AppState>,
    Form(form): Form<SignInForm>,
) -> Result<Response, ApiError> {
    if is_delete(form.method.as_deref()) {
        return Ok(sign_out().await);
    }

    let user = state
        .users
        .find(&form.email, &hash_password(&form.password))
        .await?
        .ok_or(ApiError::UserNotFound)?;

    info!(user_id = user.id, "signed in");
    Ok(Json(user).into_response())
}

pub async fn sign_out() -> Response {
    found("/")
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.users.find_all().await?))
}

pub async fn sign_up(
    State(state): State<AppState>,
    Form(form): Form<SignUpForm>,
) -> Result<Response, ApiError> {
    if form.password != form.confirm {
        return Err(ApiError::PasswordMismatch);
    }
    if state.users.exists(&form.email).await? {
        return Err(ApiError::EmailTaken);
    }

    state
        .users
        .save(&NewUser {
            name: form.name,
            email: form.email,
            password_hash: hash_password(&form.password),
        })
        .await?;

    Ok(found("/"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{header, StatusCode};
    use bbs_common::database::{Row, Value};
    use bbs_common::test_utils::MemoryDatabase;
    use tower::ServiceExt;

    use super::super::tests::{app, body_string, form};
    use super::*;

    #[tokio::test]
    async fn sign_in_returns_the_user() {
        let db = Arc::new(MemoryDatabase::connected());
        db.push_rows(vec![Row::new()
            .with("id", 1)
            .with("name", "alice")
            .with("email", "alice@example.com")]);
        let (app, _) = app(db.clone());

        let response = app
            .oneshot(form("POST", "/", "email=alice%40example.com&password=secret"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let user: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(user["name"], "alice");
        assert_eq!(
            db.statements()[0].args,
            vec![
                Value::from("alice@example.com"),
                Value::from(hash_password("secret"))
            ]
        );
    }

    #[tokio::test]
    async fn unknown_user_is_404() {
        let (app, _) = app(Arc::new(MemoryDatabase::connected()));
        let response = app
            .oneshot(form("POST", "/", "email=nobody%40example.com&password=x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn method_override_signs_out() {
        let db = Arc::new(MemoryDatabase::connected());
        let (app, _) = app(db.clone());
        let response = app
            .oneshot(form("POST", "/", "_method=DELETE"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/");
        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn sign_up_checks_confirmation() {
        let db = Arc::new(MemoryDatabase::connected());
        let (app, _) = app(db.clone());
        let response = app
            .oneshot(form(
                "POST",
                "/user",
                "name=alice&email=alice%40example.com&password=a&confirm=b",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn sign_up_rejects_taken_email() {
        let db = Arc::new(MemoryDatabase::connected());
        db.push_rows(vec![Row::new().with("id", 1)]);
        let (app, _) = app(db.clone());
        let response = app
            .oneshot(form(
                "POST",
                "/user",
                "name=alice&email=alice%40example.com&password=a&confirm=a",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(db.statements().len(), 1);
    }

    #[tokio::test]
    async fn sign_up_stores_the_hash() {
        let db = Arc::new(MemoryDatabase::connected());
        let (app, _) = app(db.clone());
        let response = app
            .oneshot(form(
                "POST",
                "/user",
                "name=alice&email=alice%40example.com&password=a&confirm=a",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        let insert = &db.statements()[1];
        assert!(insert.statement.starts_with("INSERT INTO users"));
        assert_eq!(insert.args[2], Value::from(hash_password("a")));
    }
}
