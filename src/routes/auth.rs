use super::body;
use crate::auth::{hash_password, is_valid_email, verify_password, AuthUser, MIN_PASSWORD_LEN};
use crate::error::{ApiError, ApiResult};
use crate::schema::User;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RegisterRequest {
    email: Option<String>,
    password: Option<String>,
    company_name: Option<String>,
    company_domain: Option<String>,
    contact_name: Option<String>,
    accept_terms: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct TokenResponse {
    token: String,
    email: String,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub(super) async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let req = body(payload)?;

    let (Some(email), Some(password), Some(company_name), Some(contact_name)) = (
        present(req.email),
        present(req.password),
        present(req.company_name),
        present(req.contact_name),
    ) else {
        return Err(ApiError::bad_request(
            "Company name, contact, email and password are required",
        ));
    };

    let email = email.to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("Invalid email format"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(
            "Password must be at least 8 characters long",
        ));
    }
    if req.accept_terms != Some(true) {
        return Err(ApiError::bad_request("You must accept the terms to register"));
    }

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict(
            "An account with this email already exists".to_string(),
        ));
    }

    let now = Utc::now();
    let user = state
        .store
        .insert_user(User {
            id: Uuid::new_v4(),
            email,
            password_hash: hash_password(&password).await?,
            created_at: now,
            company_name,
            company_domain: req.company_domain,
            contact_name,
            accepted_terms_at: Some(now),
        })
        .await?;

    info!("Registered user {} for company {}", user.id, user.company_name);

    let token = state.tokens.issue(user.id, &user.email)?;
    Ok(Json(TokenResponse {
        token,
        email: user.email,
    }))
}

pub(super) async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let req = body(payload)?;
    let (Some(email), Some(password)) = (present(req.email), present(req.password)) else {
        return Err(ApiError::bad_request("Email and password are required"));
    };

    let invalid = || ApiError::unauthorized("Invalid email or password");

    let user = state
        .store
        .find_user_by_email(&email.to_lowercase())
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&password, &user.password_hash).await? {
        return Err(invalid());
    }

    let token = state.tokens.issue(user.id, &user.email)?;
    Ok(Json(TokenResponse {
        token,
        email: user.email,
    }))
}

#[derive(Debug, Serialize)]
pub(super) struct MeResponse {
    email: String,
}

pub(super) async fn me(auth: AuthUser) -> Json<MeResponse> {
    Json(MeResponse { email: auth.email })
}
