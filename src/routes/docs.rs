use super::{body, current_user, ok_body, parse_id};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::schema::{Document, DocumentInput, DocumentPatch};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::Value;
use tracing::info;

const NOT_FOUND: &str = "Document not found";

pub(super) async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Document>>> {
    let me = current_user(&state, &auth).await?;
    Ok(Json(state.store.list_documents(&me.company_name).await?))
}

pub(super) async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<DocumentInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Document>)> {
    let input = body(payload)?;
    let me = current_user(&state, &auth).await?;

    let doc = input
        .into_document(me.id, &me.company_name)
        .ok_or_else(|| ApiError::bad_request("Title and content are required"))?;

    let doc = state.store.insert_document(doc).await?;
    info!("Created document {} for {}", doc.id, doc.company_name);
    Ok((StatusCode::CREATED, Json(doc)))
}

pub(super) async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<DocumentPatch>, JsonRejection>,
) -> ApiResult<Json<Document>> {
    let patch = body(payload)?;
    let me = current_user(&state, &auth).await?;
    let id = parse_id(&id, NOT_FOUND)?;
    patch.validate().map_err(ApiError::BadRequest)?;

    state
        .store
        .update_document(&me.company_name, id, &patch)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))
}

pub(super) async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let me = current_user(&state, &auth).await?;
    let id = parse_id(&id, NOT_FOUND)?;

    if !state.store.delete_document(&me.company_name, id).await? {
        return Err(ApiError::not_found(NOT_FOUND));
    }
    Ok(ok_body())
}
