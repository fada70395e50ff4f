use axum::extract::State;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::{
    ActivityKind, ActivityRefs, ClientMeta, NotificationKind, NotificationSettings,
    NotificationTarget, Profile, ProfileUpdate, User,
};
use crate::db::{activity, notifications, posts, social, stories, users};
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, ApiPath, ApiQuery, CurrentUser};
use crate::routes::LimitQuery;
use crate::state::AppState;
use crate::validation;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search", get(search))
        .route("/me", patch(update_me).delete(delete_me))
        .route("/me/notifications", put(update_notifications))
        .route("/me/blocked", get(blocked))
        .route("/me/activity", get(my_activity))
        .route("/{username}", get(profile))
        .route("/{username}/posts", get(user_posts))
        .route("/{username}/followers", get(followers))
        .route("/{username}/following", get(following))
        .route("/{username}/highlights", get(highlights))
        .route("/{username}/follow", post(follow))
        .route("/{username}/unfollow", post(unfollow))
        .route("/{username}/block", post(block))
        .route("/{username}/unblock", post(unblock))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

/// Resolve a username to an account, hiding accounts across a block.
fn visible_user(conn: &rusqlite::Connection, viewer_id: &str, username: &str) -> AppResult<User> {
    let user = users::find_by_username(conn, username)?.ok_or(AppError::NotFound)?;
    if user.id != viewer_id && social::is_blocked_either(conn, viewer_id, &user.id)? {
        return Err(AppError::NotFound);
    }
    Ok(user)
}

fn visible_profile(
    conn: &rusqlite::Connection,
    viewer_id: &str,
    username: &str,
) -> AppResult<Profile> {
    let user = visible_user(conn, viewer_id, username)?;
    users::profile(conn, viewer_id, &user.username)
}

/// Private accounts only show content to themselves and their followers.
fn ensure_can_view(viewer_id: &str, profile: &Profile) -> AppResult<()> {
    if profile.is_private && !profile.is_following && profile.id != viewer_id {
        return Err(AppError::Forbidden("This account is private".into()));
    }
    Ok(())
}

async fn search(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> AppResult<Json<Value>> {
    if query.q.trim().is_empty() {
        return Ok(Json(json!({ "success": true, "users": [] })));
    }
    let limit = query.limit.unwrap_or(20).clamp(1, 50);
    let conn = state.db.get()?;
    let users = users::search(&conn, &query.q, limit)?;
    Ok(Json(json!({ "success": true, "users": users })))
}

/// PATCH /api/users/me
async fn update_me(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> AppResult<Json<Value>> {
    validation::profile_update(&update)?;
    let conn = state.db.get()?;
    let updated = users::update_profile(&conn, &user.id, &update)?;
    Ok(Json(json!({ "success": true, "user": updated })))
}

async fn update_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(settings): ApiJson<NotificationSettings>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let updated = users::update_notification_settings(&conn, &user.id, &settings)?;
    Ok(Json(json!({ "success": true, "notifications": updated.notifications })))
}

/// DELETE /api/users/me: removes the account and everything it owns.
async fn delete_me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    users::delete(&mut conn, &user.id)?;
    Ok(Json(json!({ "success": true, "message": "Account deleted" })))
}

async fn blocked(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let users = social::blocked(&conn, &user.id)?;
    Ok(Json(json!({ "success": true, "users": users })))
}

async fn my_activity(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> AppResult<Json<Value>> {
    let limit = state.config.feed.clamp(query.limit);
    let conn = state.db.get()?;
    let activities = activity::recent(&conn, &user.id, limit)?;
    Ok(Json(json!({ "success": true, "activities": activities })))
}

async fn profile(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(username): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let profile = visible_profile(&conn, &user.id, &username)?;
    Ok(Json(json!({ "success": true, "user": profile })))
}

async fn user_posts(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(username): ApiPath<String>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> AppResult<Json<Value>> {
    let limit = state.config.feed.clamp(query.limit);
    let conn = state.db.get()?;
    let profile = visible_profile(&conn, &user.id, &username)?;
    ensure_can_view(&user.id, &profile)?;
    let posts = posts::by_user(&conn, &user.id, &profile.id, limit)?;
    Ok(Json(json!({ "success": true, "posts": posts })))
}

async fn followers(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(username): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let profile = visible_profile(&conn, &user.id, &username)?;
    ensure_can_view(&user.id, &profile)?;
    let users = social::followers(&conn, &profile.id)?;
    Ok(Json(json!({ "success": true, "users": users })))
}

async fn following(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(username): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let profile = visible_profile(&conn, &user.id, &username)?;
    ensure_can_view(&user.id, &profile)?;
    let users = social::following(&conn, &profile.id)?;
    Ok(Json(json!({ "success": true, "users": users })))
}

async fn highlights(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(username): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let profile = visible_profile(&conn, &user.id, &username)?;
    ensure_can_view(&user.id, &profile)?;
    let stories = stories::highlights(&conn, &user.id, &profile.id)?;
    Ok(Json(json!({ "success": true, "stories": stories })))
}

/// POST /api/users/{username}/follow
async fn follow(
    State(state): State<AppState>,
    user: CurrentUser,
    client: ClientMeta,
    ApiPath(username): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let target = users::find_by_username(&conn, &username)?.ok_or(AppError::NotFound)?;

    if social::follow(&conn, &user.id, &target.id)? {
        notifications::notify(
            &conn,
            &target.id,
            &user.id,
            NotificationKind::Follow,
            &NotificationTarget::default(),
        )?;
        activity::track(
            &conn,
            &user.id,
            ActivityKind::Follow,
            ActivityRefs {
                target_user_id: Some(target.id.as_str()),
                ..Default::default()
            },
            &client,
        );
    }

    let profile = users::profile(&conn, &user.id, &target.username)?;
    Ok(Json(json!({
        "success": true,
        "following": true,
        "follower_count": profile.follower_count,
    })))
}

async fn unfollow(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(username): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let target = users::find_by_username(&conn, &username)?.ok_or(AppError::NotFound)?;

    if social::unfollow(&conn, &user.id, &target.id)? {
        notifications::retract(&conn, &target.id, &user.id, NotificationKind::Follow, None)?;
    }

    let profile = users::profile(&conn, &user.id, &target.username)?;
    Ok(Json(json!({
        "success": true,
        "following": false,
        "follower_count": profile.follower_count,
    })))
}

async fn block(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(username): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    let target = users::find_by_username(&conn, &username)?.ok_or(AppError::NotFound)?;
    social::block(&mut conn, &user.id, &target.id)?;
    tracing::info!(user_id = %user.id, blocked = %target.id, "User blocked");
    Ok(Json(json!({ "success": true, "blocked": true })))
}

async fn unblock(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(username): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let target = users::find_by_username(&conn, &username)?.ok_or(AppError::NotFound)?;
    social::unblock(&conn, &user.id, &target.id)?;
    Ok(Json(json!({ "success": true, "blocked": false })))
}
