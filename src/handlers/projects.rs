use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::AppState;
use crate::aggregator::{Aggregator, ProjectOrder, ProjectSummary};
use crate::error::{EngineError, EngineResult};
use crate::models::api::ApiResponse;
use crate::month::expand_months_query;

#[derive(Debug, Deserialize)]
pub struct ProjectsQuery {
    pub months: Option<String>,
    pub quarter: Option<u32>,
    pub year: Option<i32>,
    pub top: Option<usize>,
}

pub async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<ProjectsQuery>,
) -> EngineResult<Json<ApiResponse<Vec<ProjectSummary>>>> {
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

    let top = query.top;
    let projects = tokio::task::spawn_blocking(move || -> EngineResult<Vec<ProjectSummary>> {
        let aggregator = Aggregator::new(&store);
        match top {
            Some(n) => aggregator.project_top_n(&months, n),
            None => aggregator.list_projects(&months),
        }
    })
    .await
    .map_err(|e| EngineError::Internal(e.into()))??;

    Ok(Json(ApiResponse::ok(projects)))
}

#[derive(Debug, Deserialize)]
pub struct ProjectOrdersQuery {
    pub months: Option<String>,
    pub quarter: Option<u32>,
    pub year: Option<i32>,
}

pub async fn project_orders(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<ProjectOrdersQuery>,
) -> EngineResult<Json<ApiResponse<Vec<ProjectOrder>>>> {
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

    let orders = tokio::task::spawn_blocking(move || {
        let aggregator = Aggregator::new(&store);
        aggregator.project_orders(&months, &code)
    })
    .await
    .map_err(|e| EngineError::Internal(e.into()))??;

    Ok(Json(ApiResponse::ok(orders)))
}
