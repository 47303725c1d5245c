use axum::Json;
use axum::extract::{Query, State};

use crate::AppState;
use crate::aggregator::{Aggregator, AnomalyView};
use crate::error::{EngineError, EngineResult};
use crate::handlers::departments::MonthsQuery;
use crate::models::api::ApiResponse;
use crate::month::expand_months_query;

pub async fn list_anomalies(
    State(state): State<AppState>,
    Query(query): Query<MonthsQuery>,
) -> EngineResult<Json<ApiResponse<Vec<AnomalyView>>>> {
    let store = state.store.clone();
    let anomalies = tokio::task::spawn_blocking(move || -> EngineResult<Vec<AnomalyView>> {
        let known = store.list_months()?;
        let months = expand_months_query(query.months.as_deref(), query.quarter, query.year, &known)
            .map_err(|e| EngineError::SourceInvalid { reason: e.to_string() })?;
        if months.is_empty() {
            return Err(EngineError::SourceInvalid { reason: "no months selected".to_string() });
        }
        Aggregator::new(&store).list_anomalies(&months)
    })
    .await
    .map_err(|e| EngineError::Internal(e.into()))??;
    Ok(Json(ApiResponse::ok(anomalies)))
}
