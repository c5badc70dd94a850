use super::{body, current_user, ok_body, parse_id};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::export;
use crate::schema::{validate_schema_fields, HistoryInput, HistoryItem, HistoryPatch};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

const NOT_FOUND: &str = "History item not found";

pub(super) async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<HistoryItem>>> {
    let me = current_user(&state, &auth).await?;
    let items = state.store.list_history(&me.company_name).await?;
    Ok(Json(items))
}

pub(super) async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<HistoryInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<HistoryItem>)> {
    let input = body(payload)?;
    let me = current_user(&state, &auth).await?;

    let item = input
        .into_item(me.id, &me.company_name)
        .ok_or_else(|| ApiError::bad_request("Missing required fields"))?;
    validate_schema_fields(&item.schema).map_err(ApiError::BadRequest)?;

    let item = state.store.insert_history(item).await?;
    info!("Saved history item {} ({} records)", item.id, item.extracted_data.len());
    Ok((StatusCode::CREATED, Json(item)))
}

pub(super) async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<HistoryPatch>, JsonRejection>,
) -> ApiResult<Json<HistoryItem>> {
    let patch = body(payload)?;
    let me = current_user(&state, &auth).await?;
    let id = parse_id(&id, NOT_FOUND)?;
    patch.validate().map_err(ApiError::BadRequest)?;

    state
        .store
        .update_history(&me.company_name, id, &patch)
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

    if !state.store.delete_history(&me.company_name, id).await? {
        return Err(ApiError::not_found(NOT_FOUND));
    }
    info!("Deleted history item {}", id);
    Ok(ok_body())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(super) enum ExportFormat {
    #[default]
    Csv,
    Json,
}

#[derive(Debug, Deserialize)]
pub(super) struct ExportQuery {
    #[serde(default)]
    format: ExportFormat,
}

/// Download a history item's records as CSV (schema order) or JSON.
pub(super) async fn export(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let me = current_user(&state, &auth).await?;
    let id = parse_id(&id, NOT_FOUND)?;
    let item = state
        .store
        .get_history(&me.company_name, id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    let stem = export::file_stem(&item.title);
    let (content_type, file_name, content) = match query.format {
        ExportFormat::Csv => {
            let headers: Vec<String> = item.schema.iter().map(|f| f.name.clone()).collect();
            (
                "text/csv; charset=utf-8",
                format!("{}.csv", stem),
                export::to_csv(&item.extracted_data, &headers)?,
            )
        }
        ExportFormat::Json => (
            "application/json",
            format!("{}.json", stem),
            export::to_json(&item.extracted_data)?,
        ),
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        content,
    )
        .into_response())
}
