use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::db::notifications;
use crate::error::AppResult;
use crate::extractors::{ApiPath, ApiQuery, CurrentUser};
use crate::routes::LimitQuery;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/read", post(read_all))
        .route("/{id}/read", post(read_one))
}

async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> AppResult<Json<Value>> {
    let limit = state.config.feed.clamp(query.limit);
    let conn = state.db.get()?;
    let notifications = notifications::list(&conn, &user.id, limit)?;
    let unread_count = notifications::unread_count(&conn, &user.id)?;
    Ok(Json(json!({
        "success": true,
        "notifications": notifications,
        "unread_count": unread_count,
    })))
}

async fn read_all(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let updated = notifications::mark_all_read(&conn, &user.id)?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

async fn read_one(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    notifications::mark_read(&conn, &user.id, &id)?;
    Ok(Json(json!({ "success": true })))
}
