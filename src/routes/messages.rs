use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::db::models::{
    ActivityKind, ActivityRefs, ClientMeta, NewMessage, NotificationKind, NotificationTarget,
};
use crate::db::{activity, messages, notifications};
use crate::error::AppResult;
use crate::extractors::{ApiJson, ApiPath, ApiQuery, CurrentUser};
use crate::routes::LimitQuery;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(send))
        .route("/conversations", get(conversations))
        .route("/conversations/{id}", get(conversation))
        .route("/{id}", delete(remove))
        .route("/{id}/like", post(like))
        .route("/{id}/unlike", post(unlike))
}

/// POST /api/messages
async fn send(
    State(state): State<AppState>,
    user: CurrentUser,
    client: ClientMeta,
    ApiJson(new_message): ApiJson<NewMessage>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let mut conn = state.db.get()?;
    let message = messages::send(&mut conn, &user.id, &new_message)?;

    notifications::notify(
        &conn,
        &message.recipient_id,
        &user.id,
        NotificationKind::Message,
        &NotificationTarget {
            message_id: Some(message.id.as_str()),
            ..Default::default()
        },
    )?;
    activity::track(
        &conn,
        &user.id,
        ActivityKind::Message,
        ActivityRefs {
            target_user_id: Some(message.recipient_id.as_str()),
            ..Default::default()
        },
        &client,
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": message })),
    ))
}

async fn conversations(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let conversations = messages::conversations_for(&conn, &user.id)?;
    Ok(Json(json!({ "success": true, "conversations": conversations })))
}

/// GET /api/messages/conversations/{id}: reading a conversation marks
/// the caller's incoming messages read.
async fn conversation(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> AppResult<Json<Value>> {
    let limit = state.config.feed.clamp(query.limit);
    let conn = state.db.get()?;
    let messages = messages::messages(&conn, &user.id, &id, limit)?;
    let marked = messages::mark_read(&conn, &user.id, &id)?;
    if marked > 0 {
        tracing::debug!(conversation_id = %id, marked, "Marked messages read");
    }
    let conversation = messages::conversation(&conn, &user.id, &id)?;
    Ok(Json(json!({
        "success": true,
        "conversation": conversation,
        "messages": messages,
    })))
}

async fn remove(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    messages::delete(&conn, &user.id, &id)?;
    Ok(Json(json!({ "success": true, "message": "Message deleted" })))
}

async fn like(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let message = messages::set_liked(&conn, &user.id, &id, true)?;
    Ok(Json(json!({ "success": true, "data": message })))
}

async fn unlike(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let message = messages::set_liked(&conn, &user.id, &id, false)?;
    Ok(Json(json!({ "success": true, "data": message })))
}
