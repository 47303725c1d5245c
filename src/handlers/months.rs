use axum::Json;
use axum::extract::{Path, State};

use crate::AppState;
use crate::error::EngineResult;
use crate::models::api::ApiResponse;
use crate::month::YearMonth;

pub async fn list_months(
    State(state): State<AppState>,
) -> EngineResult<Json<ApiResponse<Vec<YearMonth>>>> {
    let store = state.store.clone();
    let months = tokio::task::spawn_blocking(move || store.list_months())
        .await
        .map_err(|e| crate::error::EngineError::Internal(e.into()))??;
    Ok(Json(ApiResponse::ok(months)))
}

pub async fn delete_month(
    State(state): State<AppState>,
    Path(month): Path<String>,
) -> EngineResult<Json<ApiResponse<()>>> {
    let month: YearMonth = month
        .parse()
        .map_err(|_| crate::error::EngineError::SourceInvalid { reason: format!("invalid month: {month}") })?;
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || store.delete_month(month))
        .await
        .map_err(|e| crate::error::EngineError::Internal(e.into()))??;
    Ok(Json(ApiResponse::empty(format!("deleted {month}"))))
}
