use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::aggregator::{Aggregator, MonthlyTrend, Summary};
use crate::error::{EngineError, EngineResult};
use crate::models::api::ApiResponse;
use crate::month::expand_months_query;

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    pub months: Option<String>,
    pub quarter: Option<u32>,
    pub year: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeBundle {
    pub summary: Summary,
    pub trend: Vec<MonthlyTrend>,
}

pub async fn analyze(
    State(state): State<AppState>,
    Query(query): Query<AnalyzeQuery>,
) -> EngineResult<Json<ApiResponse<AnalyzeBundle>>> {
    let store = state.store.clone();
    let known = tokio::task::spawn_blocking({
        let store = store.clone();
        move || store.list_months()
    })
    .await
    .map_err(|e| EngineError::Internal(e.into()))??;

    let months = expand_months_query(query.months.as_deref(), query.quarter, query.year, &known)
        .map_err(|e| EngineError::SourceInvalid { reason: e.to_string() })?;
    if months.is_empty() {
        return Err(EngineError::SourceInvalid { reason: "no months selected".to_string() });
    }

    let bundle = tokio::task::spawn_blocking(move || -> EngineResult<AnalyzeBundle> {
        let aggregator = Aggregator::new(&store);
        let summary = aggregator.summary(&months)?;
        let trend = aggregator.monthly_trend(&months)?;
        Ok(AnalyzeBundle { summary, trend })
    })
    .await
    .map_err(|e| EngineError::Internal(e.into()))??;

    Ok(Json(ApiResponse::ok(bundle)))
}
