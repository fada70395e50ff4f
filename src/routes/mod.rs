pub mod auth;
pub mod comments;
pub mod messages;
pub mod notifications;
pub mod posts;
pub mod stories;
pub mod upload;
pub mod users;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::extractors::require_auth;
use crate::state::AppState;

const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Optional `?limit=` on listing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// Build the full API router. Everything outside the public auth routes,
/// the welcome page and uploaded files sits behind the bearer-token gate.
pub fn app(state: AppState) -> Router {
    let protected = Router::new()
        .merge(auth::protected())
        .nest("/api/posts", posts::router())
        .nest("/api/users", users::router())
        .nest("/api/comments", comments::router())
        .nest("/api/messages", messages::router())
        .nest("/api/stories", stories::router())
        .nest("/api/notifications", notifications::router())
        .merge(upload::protected())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Largest allowed file plus multipart framing.
    let body_limit = state.config.storage.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/", get(welcome))
        .merge(auth::public())
        .merge(upload::public())
        .merge(protected)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn welcome() -> &'static str {
    "Welcome to the Graphicgram API"
}
