use super::{body, current_user};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extractor::{history_title, validate_request, ExtractionMode};
use crate::schema::{validate_schema_fields, ExtractedRecord, HistoryItem, SchemaField};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ExtractRequest {
    #[serde(default)]
    legacy_data: String,
    #[serde(default)]
    schema: Vec<SchemaField>,
    /// Also record the run in the company's history.
    #[serde(default)]
    save: bool,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ExtractResponse {
    records: Vec<ExtractedRecord>,
    mode: ExtractionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    history_item: Option<HistoryItem>,
}

pub(super) async fn extract(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> ApiResult<Json<ExtractResponse>> {
    let req = body(payload)?;
    let me = current_user(&state, &auth).await?;
    validate_request(&req.legacy_data, &req.schema).map_err(ApiError::bad_request)?;
    if req.save {
        validate_schema_fields(&req.schema).map_err(ApiError::BadRequest)?;
    }

    let extraction = state.extractor.extract(&req.legacy_data, &req.schema).await;
    info!(
        "Extracted {} records for {} (mode={:?})",
        extraction.records.len(),
        me.company_name,
        extraction.mode
    );

    let history_item = if req.save {
        let title = req
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| history_title(&req.legacy_data));
        let item = HistoryItem {
            id: Uuid::new_v4(),
            user: me.id,
            company_name: me.company_name.clone(),
            title,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            legacy_data: req.legacy_data,
            schema: req.schema,
            extracted_data: extraction.records.clone(),
            created_at: Utc::now(),
        };
        Some(state.store.insert_history(item).await?)
    } else {
        None
    };

    Ok(Json(ExtractResponse {
        records: extraction.records,
        mode: extraction.mode,
        history_item,
    }))
}
