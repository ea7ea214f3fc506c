use axum::extract::State;
use axum::response::Response;
use axum::{Form, Json};
use serde::Deserialize;

use bbs_common::model::{Message, NewMessage};

use super::{found, is_delete, ApiError, AppState};

#[derive(Deserialize, Debug)]
pub struct PostForm {
    user_id: Option<i64>,
    #[serde(default)]
    message: String,
    #[serde(rename = "_method")]
    method: Option<String>,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Message>>, ApiError> {
    Ok(Json(state.messages.find_all().await?))
}

pub async fn post(
    State(state): State<AppState>,
    Form(form): Form<PostForm>,
) -> Result<Response, ApiError> {
    if is_delete(form.method.as_deref()) {
        return Ok(found("/"));
    }

    let user_id = form.user_id.ok_or(ApiError::MissingField("user_id"))?;
    state
        .messages
        .save(&NewMessage {
            user_id,
            message: form.message,
        })
        .await?;

    Ok(found("/bbs"))
}
