use axum::Json;
use axum::extract::{Multipart, Path, State};

use crate::AppState;
use crate::error::{EngineError, EngineResult};
use crate::ingestor;
use crate::models::api::ApiResponse;
use crate::models::progress::ProgressTask;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize)]
pub struct UploadAccepted {
    pub task_id: String,
}

pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> EngineResult<Json<ApiResponse<UploadAccepted>>> {
    let mut file_name = None;
    let mut bytes = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| EngineError::SourceInvalid { reason: e.to_string() })?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| EngineError::SourceInvalid { reason: e.to_string() })?
                    .to_vec(),
            );
        }
    }

    let file_name = file_name.ok_or_else(|| EngineError::SourceInvalid {
        reason: "missing file field in multipart upload".to_string(),
    })?;
    let bytes = bytes.ok_or_else(|| EngineError::SourceInvalid {
        reason: "missing file content in multipart upload".to_string(),
    })?;

    let task_id = uuid::Uuid::new_v4().to_string();
    let store = state.store.clone();
    let task_id_for_store = task_id.clone();
    let file_name_for_store = file_name.clone();
    tokio::task::spawn_blocking(move || store.progress_create(&task_id_for_store, &file_name_for_store))
        .await
        .map_err(|e| EngineError::Internal(e.into()))??;

    ingestor::spawn_ingestion(
        state.store.clone(),
        task_id.clone(),
        file_name,
        bytes,
        state.config.upload_dir.clone(),
        CancellationToken::new(),
    );

    Ok(Json(ApiResponse::ok(UploadAccepted { task_id })))
}

pub async fn progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> EngineResult<Json<ApiResponse<Option<ProgressTask>>>> {
    let store = state.store.clone();
    let task_id_clone = task_id.clone();
    let task = tokio::task::spawn_blocking(move || store.progress_get(&task_id_clone))
        .await
        .map_err(|e| EngineError::Internal(e.into()))??;
    Ok(Json(ApiResponse::ok(task)))
}
