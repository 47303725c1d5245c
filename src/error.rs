use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// The engine's error taxonomy. Row-level defects are never represented here —
/// see `NormaliserWarning`/`ValidatorWarning` — this type is reserved for the
/// outcomes that fail a whole operation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("source invalid: {reason}")]
    SourceInvalid { reason: String },

    /// Never constructed: an unknown month simply contributes zero rows to a
    /// query, it does not raise an error. Kept so doc comments have somewhere
    /// to point.
    #[error("unknown month")]
    UnknownMonth,

    #[error("store contention: {0}")]
    StoreContention(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Internal(e.into())
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            EngineError::SourceInvalid { reason } => (StatusCode::BAD_REQUEST, reason.clone()),
            EngineError::UnknownMonth => (StatusCode::OK, String::new()),
            EngineError::StoreContention(detail) => {
                (StatusCode::CONFLICT, format!("store contention: {detail}"))
            }
            EngineError::Cancelled => (StatusCode::from_u16(499).unwrap(), "cancelled".to_string()),
            EngineError::Internal(e) => {
                tracing::error!("internal error: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (
            status,
            Json(json!({
                "success": false,
                "message": message,
            })),
        )
            .into_response()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
