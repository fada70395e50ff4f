use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::db::models::NewStory;
use crate::db::stories;
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, ApiPath, CurrentUser};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(active).post(create))
        .route("/{id}", delete(remove))
        .route("/{id}/view", post(view))
}

/// GET /api/stories: the caller's tray.
async fn active(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let stories = stories::active_for(&conn, &user.id)?;
    Ok(Json(json!({ "success": true, "stories": stories })))
}

async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(story): ApiJson<NewStory>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if story.media.trim().is_empty() {
        return Err(AppError::BadRequest("A story needs media".into()));
    }
    let conn = state.db.get()?;
    let id = stories::create(&conn, &user.id, &story)?;
    let story = stories::get(&conn, &user.id, &id)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "story": story })),
    ))
}

async fn view(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let story = stories::get(&conn, &user.id, &id)?;
    if story.user.id != user.id {
        stories::record_view(&conn, &id, &user.id)?;
    }
    let story = stories::get(&conn, &user.id, &id)?;
    Ok(Json(json!({ "success": true, "story": story })))
}

async fn remove(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    if stories::owner(&conn, &id)? != user.id {
        return Err(AppError::Forbidden(
            "You can only delete your own stories".into(),
        ));
    }
    stories::delete(&conn, &id)?;
    Ok(Json(json!({ "success": true, "message": "Story deleted" })))
}
