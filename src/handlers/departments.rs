use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::aggregator::{Aggregator, DepartmentDetails, DepartmentHierarchy, DepartmentStat};
use crate::error::{EngineError, EngineResult};
use crate::models::api::ApiResponse;
use crate::month::expand_months_query;

#[derive(Debug, Deserialize)]
pub struct MonthsQuery {
    pub months: Option<String>,
    pub quarter: Option<u32>,
    pub year: Option<i32>,
}

fn resolve_months(
    store: &crate::store::Store,
    query: &MonthsQuery,
) -> EngineResult<std::collections::BTreeSet<crate::month::YearMonth>> {
    let known = store.list_months()?;
    let months = expand_months_query(query.months.as_deref(), query.quarter, query.year, &known)
        .map_err(|e| EngineError::SourceInvalid { reason: e.to_string() })?;
    if months.is_empty() {
        return Err(EngineError::SourceInvalid { reason: "no months selected".to_string() });
    }
    Ok(months)
}

pub async fn hierarchy(
    State(state): State<AppState>,
    Query(query): Query<MonthsQuery>,
) -> EngineResult<Json<ApiResponse<DepartmentHierarchy>>> {
    let store = state.store.clone();
    let hierarchy = tokio::task::spawn_blocking(move || -> EngineResult<DepartmentHierarchy> {
        let months = resolve_months(&store, &query)?;
        Aggregator::new(&store).department_hierarchy(&months)
    })
    .await
    .map_err(|e| EngineError::Internal(e.into()))??;
    Ok(Json(ApiResponse::ok(hierarchy)))
}

#[derive(Debug, Deserialize)]
pub struct DepartmentListQuery {
    #[serde(flatten)]
    pub months: MonthsQuery,
    pub level: u8,
    pub parent: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<DepartmentListQuery>,
) -> EngineResult<Json<ApiResponse<Vec<DepartmentStat>>>> {
    let store = state.store.clone();
    let list = tokio::task::spawn_blocking(move || -> EngineResult<Vec<DepartmentStat>> {
        let months = resolve_months(&store, &query.months)?;
        Aggregator::new(&store).department_list(&months, query.level, query.parent.as_deref())
    })
    .await
    .map_err(|e| EngineError::Internal(e.into()))??;
    Ok(Json(ApiResponse::ok(list)))
}

#[derive(Debug, Deserialize)]
pub struct DepartmentDetailsQuery {
    #[serde(flatten)]
    pub months: MonthsQuery,
    pub name: String,
    pub level: u8,
}

pub async fn details(
    State(state): State<AppState>,
    Query(query): Query<DepartmentDetailsQuery>,
) -> EngineResult<Json<ApiResponse<DepartmentDetails>>> {
    let store = state.store.clone();
    let details = tokio::task::spawn_blocking(move || -> EngineResult<DepartmentDetails> {
        let months = resolve_months(&store, &query.months)?;
        Aggregator::new(&store).department_details(&months, &query.name, query.level)
    })
    .await
    .map_err(|e| EngineError::Internal(e.into()))??;
    Ok(Json(ApiResponse::ok(details)))
}

#[derive(Debug, Deserialize)]
pub struct LevelStatisticsQuery {
    #[serde(flatten)]
    pub months: MonthsQuery,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct LevelStatistics {
    pub own: DepartmentDetails,
    pub children: Vec<(String, DepartmentDetails)>,
}

pub async fn level1_statistics(
    State(state): State<AppState>,
    Query(query): Query<LevelStatisticsQuery>,
) -> EngineResult<Json<ApiResponse<LevelStatistics>>> {
    let store = state.store.clone();
    let stats = tokio::task::spawn_blocking(move || -> EngineResult<LevelStatistics> {
        let months = resolve_months(&store, &query.months)?;
        let (own, children) = Aggregator::new(&store).level1_statistics(&months, &query.name)?;
        Ok(LevelStatistics { own, children })
    })
    .await
    .map_err(|e| EngineError::Internal(e.into()))??;
    Ok(Json(ApiResponse::ok(stats)))
}

pub async fn level2_statistics(
    State(state): State<AppState>,
    Query(query): Query<LevelStatisticsQuery>,
) -> EngineResult<Json<ApiResponse<LevelStatistics>>> {
    let store = state.store.clone();
    let stats = tokio::task::spawn_blocking(move || -> EngineResult<LevelStatistics> {
        let months = resolve_months(&store, &query.months)?;
        let (own, children) = Aggregator::new(&store).level2_statistics(&months, &query.name)?;
        Ok(LevelStatistics { own, children })
    })
    .await
    .map_err(|e| EngineError::Internal(e.into()))??;
    Ok(Json(ApiResponse::ok(stats)))
}
