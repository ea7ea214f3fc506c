use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing, Router};
use thiserror::Error;
use tracing::error;

use bbs_common::database::{ConnectionState, Database, DatabaseError};
use bbs_common::health::{HealthRegistry, HealthStatus};
use bbs_common::model::{MessageModel, UserModel};
use bbs_common::shutdown::ShutdownSignal;

mod bbs;
mod user;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub users: UserModel,
    pub messages: MessageModel,
    pub liveness: HealthRegistry,
    pub shutdown: ShutdownSignal,
}

impl AppState {
    pub fn new(db: Arc<dyn Database>, liveness: HealthRegistry, shutdown: ShutdownSignal) -> Self {
        Self {
            users: UserModel::new(db.clone()),
            messages: MessageModel::new(db.clone()),
            db,
            liveness,
            shutdown,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/",
            routing::get(index)
                .post(user::sign_in)
                .delete(user::sign_out),
        )
        .route("/user", routing::get(user::list).post(user::sign_up))
        .route(
            "/bbs",
            routing::get(bbs::list)
                .post(bbs::post)
                .delete(user::sign_out),
        )
        .route("/_readiness", routing::get(readiness))
        .route("/_liveness", routing::get(liveness))
        .with_state(state)
}

pub async fn index() -> &'static str {
    "bbs-sample"
}

/// Ready only while the store is connected and no shutdown is in progress.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.is_cancelled() || state.db.state() != ConnectionState::Connected {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

async fn liveness(State(state): State<AppState>) -> HealthStatus {
    state.liveness.get_status()
}

/// HTML forms cannot send DELETE, so they post with `_method=DELETE`.
fn is_delete(method: Option<&str>) -> bool {
    method.is_some_and(|m| m.eq_ignore_ascii_case("DELETE"))
}

/// 302 to `location`.
fn found(location: &'static str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("user not found")]
    UserNotFound,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("email is already registered")]
    EmailTaken,
    #[error("missing form field: {0}")]
    MissingField(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Database(e) => {
                error!("database error while handling request: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::UserNotFound => StatusCode::NOT_FOUND,
            ApiError::PasswordMismatch | ApiError::MissingField(_) => StatusCode::BAD_REQUEST,
            ApiError::EmailTaken => StatusCode::CONFLICT,
        };
        (status, self.to_string()).into_response()
    }
}
