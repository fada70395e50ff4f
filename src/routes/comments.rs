use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::{
    ActivityKind, ActivityRefs, ClientMeta, NotificationKind, NotificationTarget,
};
use crate::db::{activity, comments, notifications, posts, users};
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, ApiPath, CurrentUser};
use crate::state::AppState;
use crate::{text, validation};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/post/{post_id}", get(for_post))
        .route("/{id}", patch(edit).delete(remove))
        .route("/{id}/like", post(like))
        .route("/{id}/unlike", post(unlike))
}

#[derive(Debug, Deserialize)]
struct CreateComment {
    post_id: String,
    text: String,
    #[serde(default)]
    parent_comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EditComment {
    text: String,
}

async fn for_post(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(post_id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    posts::get(&conn, &user.id, &post_id)?;
    let comments = comments::for_post(&conn, &user.id, &post_id)?;
    Ok(Json(json!({ "success": true, "comments": comments })))
}

/// POST /api/comments
async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    client: ClientMeta,
    ApiJson(req): ApiJson<CreateComment>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validation::comment_text(&req.text)?;

    let conn = state.db.get()?;
    let post = posts::get(&conn, &user.id, &req.post_id)?;
    if post.is_comments_disabled {
        return Err(AppError::Forbidden(
            "Comments are disabled for this post".into(),
        ));
    }

    let comment_id = comments::create(
        &conn,
        &post.id,
        &user.id,
        &req.text,
        req.parent_comment.as_deref(),
    )?;

    let target = NotificationTarget {
        post_id: Some(post.id.as_str()),
        comment_id: Some(comment_id.as_str()),
        ..Default::default()
    };
    notifications::notify(&conn, &post.user.id, &user.id, NotificationKind::Comment, &target)?;
    for mentioned in users::ids_for_usernames(&conn, &text::mentions(&req.text))? {
        if mentioned != post.user.id {
            notifications::notify(&conn, &mentioned, &user.id, NotificationKind::Mention, &target)?;
        }
    }
    activity::track(
        &conn,
        &user.id,
        ActivityKind::Comment,
        ActivityRefs {
            post_id: Some(post.id.as_str()),
            comment_id: Some(comment_id.as_str()),
            target_user_id: Some(post.user.id.as_str()),
        },
        &client,
    );

    let comment = comments::get(&conn, &user.id, &comment_id)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "comment": comment })),
    ))
}

async fn edit(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<EditComment>,
) -> AppResult<Json<Value>> {
    validation::comment_text(&req.text)?;
    let conn = state.db.get()?;
    if comments::lookup(&conn, &id)?.user_id != user.id {
        return Err(AppError::Forbidden(
            "You can only edit your own comments".into(),
        ));
    }
    comments::update_text(&conn, &id, &req.text)?;
    let comment = comments::get(&conn, &user.id, &id)?;
    Ok(Json(json!({ "success": true, "comment": comment })))
}

/// DELETE /api/comments/{id}: allowed for the comment's author and the
/// owner of the post it sits on.
async fn remove(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let comment = comments::lookup(&conn, &id)?;
    let post_owner = posts::ownership(&conn, &comment.post_id)?.user_id;
    if comment.user_id != user.id && post_owner != user.id {
        return Err(AppError::Forbidden(
            "You cannot delete this comment".into(),
        ));
    }
    comments::delete(&conn, &id)?;
    Ok(Json(json!({ "success": true, "message": "Comment deleted" })))
}

async fn like(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let comment = comments::lookup(&conn, &id)?;
    posts::get(&conn, &user.id, &comment.post_id)?;
    comments::like(&conn, &id, &user.id)?;
    let like_count = comments::like_count(&conn, &id)?;
    Ok(Json(json!({ "success": true, "liked": true, "like_count": like_count })))
}

async fn unlike(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    comments::lookup(&conn, &id)?;
    comments::unlike(&conn, &id, &user.id)?;
    let like_count = comments::like_count(&conn, &id)?;
    Ok(Json(json!({ "success": true, "liked": false, "like_count": like_count })))
}
