use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::month::YearMonth;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: String,
    pub file_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub months_covered: Vec<YearMonth>,
    pub parsed: bool,
    pub last_analysed_at: Option<DateTime<Utc>>,
}
