//! HTTP routes, all mounted under `/api`.

mod auth;
mod docs;
mod extract;
mod history;
mod users;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::rate_limit::limit_requests;
use crate::schema::User;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

pub fn api_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/users/me", get(users::get_profile).put(users::update_profile))
        .route("/history", get(history::list).post(history::create))
        .route("/history/:id", put(history::update).delete(history::remove))
        .route("/history/:id/export", get(history::export))
        .route("/docs", get(docs::list).post(docs::create))
        .route("/docs/:id", put(docs::update).delete(docs::remove))
        .route("/extract", post(extract::extract))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_database));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(middleware::from_fn_with_state(state, limit_requests))
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health(State(state): State<AppState>) -> Json<Value> {
    let db = if state.store.is_ready() {
        "connected"
    } else {
        "disconnected"
    };
    Json(json!({ "status": "ok", "db": db }))
}

/// Fail fast while the store is unreachable instead of letting requests hang.
async fn require_database(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.store.is_ready() {
        next.run(request).await
    } else {
        ApiError::Unavailable("Database not connected".to_string()).into_response()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Unwrap a JSON body. Rejections keep axum's status (400, 413, 415, 422)
/// but answer with the usual `{"error": ...}` body.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::Rejected(rejection.status(), rejection.body_text()))
}

/// Load the caller's account; a token for a deleted user is unauthorized.
async fn current_user(state: &AppState, auth: &AuthUser) -> ApiResult<User> {
    state
        .store
        .find_user(auth.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Unauthorized"))
}

/// Path ids that are not UUIDs cannot name a stored row.
fn parse_id(raw: &str, not_found: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found(not_found))
}

fn ok_body() -> Json<Value> {
    Json(json!({ "ok": true }))
}
