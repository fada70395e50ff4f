use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::db::models::{
    ActivityKind, ActivityRefs, ClientMeta, NewPost, NotificationKind, NotificationTarget,
    PostUpdate,
};
use crate::db::{activity, hashtags, notifications, posts};
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, ApiPath, ApiQuery, CurrentUser};
use crate::routes::LimitQuery;
use crate::state::AppState;
use crate::validation;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/feed", get(feed))
        .route("/explore", get(explore))
        .route("/saved", get(saved))
        .route("/hashtags/trending", get(trending))
        .route("/hashtag/{name}", get(by_hashtag))
        .route("/{id}", get(show).patch(update).delete(remove))
        .route("/{id}/like", post(like))
        .route("/{id}/unlike", post(unlike))
        .route("/{id}/save", post(save))
        .route("/{id}/unsave", post(unsave))
}

/// GET /api/posts/feed
async fn feed(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> AppResult<Json<Value>> {
    let limit = state.config.feed.clamp(query.limit);
    let conn = state.db.get()?;
    let posts = posts::feed(&conn, &user.id, limit)?;
    Ok(Json(json!({ "success": true, "posts": posts })))
}

async fn explore(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> AppResult<Json<Value>> {
    let limit = state.config.feed.clamp(query.limit);
    let conn = state.db.get()?;
    let posts = posts::explore(&conn, &user.id, limit)?;
    Ok(Json(json!({ "success": true, "posts": posts })))
}

async fn saved(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> AppResult<Json<Value>> {
    let limit = state.config.feed.clamp(query.limit);
    let conn = state.db.get()?;
    let posts = posts::saved(&conn, &user.id, limit)?;
    Ok(Json(json!({ "success": true, "posts": posts })))
}

async fn trending(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> AppResult<Json<Value>> {
    let limit = query.limit.unwrap_or(10).clamp(1, 50);
    let conn = state.db.get()?;
    let hashtags = hashtags::trending(&conn, limit)?;
    Ok(Json(json!({ "success": true, "hashtags": hashtags })))
}

async fn by_hashtag(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(name): ApiPath<String>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> AppResult<Json<Value>> {
    let limit = state.config.feed.clamp(query.limit);
    let conn = state.db.get()?;
    let hashtag = hashtags::find(&conn, &name)?;
    let posts = posts::by_hashtag(&conn, &user.id, &name, limit)?;
    Ok(Json(json!({ "success": true, "hashtag": hashtag, "posts": posts })))
}

/// POST /api/posts
async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    client: ClientMeta,
    ApiJson(new_post): ApiJson<NewPost>,
) -> AppResult<(StatusCode, Json<Value>)> {
    validation::new_post(&new_post)?;

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    let post_id = posts::create(&tx, &user.id, &new_post)?;
    tx.commit()?;

    let target = NotificationTarget {
        post_id: Some(post_id.as_str()),
        ..Default::default()
    };
    for mentioned in posts::mentioned_user_ids(&conn, &post_id)? {
        notifications::notify(&conn, &mentioned, &user.id, NotificationKind::Mention, &target)?;
    }
    activity::track(
        &conn,
        &user.id,
        ActivityKind::Post,
        ActivityRefs {
            post_id: Some(post_id.as_str()),
            ..Default::default()
        },
        &client,
    );

    let post = posts::get(&conn, &user.id, &post_id)?;
    tracing::info!(post_id = %post.id, user_id = %user.id, "Post created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "post": post })),
    ))
}

async fn show(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let post = posts::get(&conn, &user.id, &id)?;
    Ok(Json(json!({ "success": true, "post": post })))
}

fn ensure_owner(conn: &rusqlite::Connection, user_id: &str, post_id: &str) -> AppResult<()> {
    if posts::ownership(conn, post_id)?.user_id != user_id {
        return Err(AppError::Forbidden(
            "You can only modify your own posts".into(),
        ));
    }
    Ok(())
}

async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(update): ApiJson<PostUpdate>,
) -> AppResult<Json<Value>> {
    if let Some(ref caption) = update.caption {
        validation::caption(caption)?;
    }

    let mut conn = state.db.get()?;
    ensure_owner(&conn, &user.id, &id)?;
    let tx = conn.transaction()?;
    posts::update(&tx, &id, &update)?;
    tx.commit()?;

    let post = posts::get(&conn, &user.id, &id)?;
    Ok(Json(json!({ "success": true, "post": post })))
}

async fn remove(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    ensure_owner(&conn, &user.id, &id)?;
    let tx = conn.transaction()?;
    posts::delete(&tx, &id)?;
    tx.commit()?;
    tracing::info!(post_id = %id, user_id = %user.id, "Post deleted");
    Ok(Json(json!({ "success": true, "message": "Post deleted" })))
}

/// POST /api/posts/{id}/like
async fn like(
    State(state): State<AppState>,
    user: CurrentUser,
    client: ClientMeta,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let post = posts::get(&conn, &user.id, &id)?;

    if posts::like(&conn, &id, &user.id)? {
        notifications::notify(
            &conn,
            &post.user.id,
            &user.id,
            NotificationKind::Like,
            &NotificationTarget {
                post_id: Some(id.as_str()),
                ..Default::default()
            },
        )?;
        activity::track(
            &conn,
            &user.id,
            ActivityKind::Like,
            ActivityRefs {
                post_id: Some(id.as_str()),
                target_user_id: Some(post.user.id.as_str()),
                ..Default::default()
            },
            &client,
        );
    }

    let like_count = posts::like_count(&conn, &id)?;
    Ok(Json(json!({ "success": true, "liked": true, "like_count": like_count })))
}

async fn unlike(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let post = posts::get(&conn, &user.id, &id)?;

    if posts::unlike(&conn, &id, &user.id)? {
        notifications::retract(
            &conn,
            &post.user.id,
            &user.id,
            NotificationKind::Like,
            Some(id.as_str()),
        )?;
    }

    let like_count = posts::like_count(&conn, &id)?;
    Ok(Json(json!({ "success": true, "liked": false, "like_count": like_count })))
}

async fn save(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    posts::get(&conn, &user.id, &id)?;
    posts::save(&conn, &id, &user.id)?;
    let like_count = posts::like_count(&conn, &id)?;
    Ok(Json(json!({ "success": true, "saved": true, "like_count": like_count })))
}

async fn unsave(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    posts::ownership(&conn, &id)?;
    posts::unsave(&conn, &id, &user.id)?;
    let like_count = posts::like_count(&conn, &id)?;
    Ok(Json(json!({ "success": true, "saved": false, "like_count": like_count })))
}
