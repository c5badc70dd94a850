use super::body;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::schema::{ProfilePatch, UserProfile};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use tracing::info;

const USER_NOT_FOUND: &str = "User not found";

pub(super) async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<UserProfile>> {
    let user = state
        .store
        .find_user(auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(USER_NOT_FOUND))?;
    Ok(Json(UserProfile::from(&user)))
}

pub(super) async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<ProfilePatch>, JsonRejection>,
) -> ApiResult<Json<UserProfile>> {
    let patch = body(payload)?;
    patch.validate().map_err(ApiError::BadRequest)?;

    let user = state
        .store
        .update_user_profile(auth.user_id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found(USER_NOT_FOUND))?;

    info!("Updated profile for user {}", user.id);
    Ok(Json(UserProfile::from(&user)))
}
