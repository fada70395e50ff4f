use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::{password, session};
use crate::db::models::{ActivityKind, ActivityRefs, ClientMeta, NewUser, User};
use crate::db::{activity, users};
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, CurrentUser};
use crate::state::AppState;
use crate::validation::{self, SignupRequest};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    #[serde(alias = "email", alias = "username")]
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub expires_at: String,
    pub user: User,
}

/// Insert the account and its first session together, or neither.
fn open_account(
    conn: &mut Connection,
    new_user: &NewUser,
    token_hours: u64,
) -> AppResult<(User, session::IssuedSession)> {
    let tx = conn.transaction()?;
    let user = users::create(&tx, new_user)?;
    let issued = session::create_session(&tx, &user.id, token_hours)?;
    tx.commit()?;
    Ok((user, issued))
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    client: ClientMeta,
    ApiJson(req): ApiJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let (username, email, full_name) = validation::signup(&req)?;
    let password_hash = password::hash(req.password, state.config.auth.bcrypt_cost).await?;

    let mut conn = state.db.get()?;
    let (user, issued) = open_account(
        &mut conn,
        &NewUser {
            username,
            email,
            password_hash,
            full_name,
        },
        state.config.auth.token_hours,
    )?;
    activity::track(&conn, &user.id, ActivityKind::Login, ActivityRefs::default(), &client);
    tracing::info!(user_id = %user.id, username = %user.username, "Registered account");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            token: issued.token,
            expires_at: issued.expires_at,
            user,
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    client: ClientMeta,
    ApiJson(req): ApiJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    if req.identifier.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest(
            "Username or email and password are required".into(),
        ));
    }

    let user = {
        let conn = state.db.get()?;
        users::find_by_identifier(&conn, &req.identifier)?
    };
    let Some(user) = user else {
        tracing::debug!("Login failed: unknown identifier");
        return Err(AppError::InvalidCredentials);
    };
    if !password::verify(req.password, user.password_hash.clone()).await? {
        tracing::debug!(user_id = %user.id, "Login failed: wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let conn = state.db.get()?;
    let issued = session::create_session(&conn, &user.id, state.config.auth.token_hours)?;
    users::touch_last_active(&conn, &user.id)?;
    activity::track(&conn, &user.id, ActivityKind::Login, ActivityRefs::default(), &client);
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(AuthResponse {
        success: true,
        token: issued.token,
        expires_at: issued.expires_at,
        user,
    }))
}

/// GET /api/auth/me
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let user = users::get(&conn, &user.id)?;
    Ok(Json(json!({ "success": true, "user": user })))
}

/// POST /api/auth/logout: revokes the token the request carried.
pub async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
    client: ClientMeta,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    session::delete_session(&conn, &user.token)?;
    activity::track(&conn, &user.id, ActivityKind::Logout, ActivityRefs::default(), &client);
    tracing::info!(user_id = %user.id, "User logged out");
    Ok(Json(json!({ "success": true, "message": "Logged out" })))
}
