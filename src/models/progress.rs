use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStatus {
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl ProgressStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressStatus::Completed | ProgressStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressStep {
    pub label: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressTask {
    pub task_id: String,
    pub file_name: String,
    pub status: ProgressStatus,
    pub progress: u8,
    pub current_step: String,
    pub steps: Vec<ProgressStep>,
    pub error: Option<String>,
}

/// A partial update applied to a `ProgressTask` by the owning Ingestor task.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub status: ProgressStatus,
    pub progress: u8,
    pub step_label: String,
    pub error: Option<String>,
}
