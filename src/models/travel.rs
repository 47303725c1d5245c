use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::month::YearMonth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TravelKind {
    Flight,
    Hotel,
    Train,
}

impl TravelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelKind::Flight => "FLIGHT",
            TravelKind::Hotel => "HOTEL",
            TravelKind::Train => "TRAIN",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelRow {
    pub id: String,
    pub kind: TravelKind,
    pub event_date: NaiveDate,
    pub booker_name: String,
    pub traveller_name: String,
    pub department_path: Vec<String>,
    pub amount: f64,
    pub project_code: Option<String>,
    pub project_name: Option<String>,
    pub advance_days: i64,
    pub is_over_standard: bool,
    pub over_standard_reason: String,
    pub source_month: YearMonth,
}

/// The synthetic bucket label rendered for rows with no project code,
/// preserved verbatim because a front-end consumer renders it as
/// "未知编号/未知项目".
pub const UNKNOWN_PROJECT_CODE: &str = "nan";

impl TravelRow {
    pub fn project_code_label(&self) -> &str {
        self.project_code.as_deref().unwrap_or(UNKNOWN_PROJECT_CODE)
    }
}
