use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::attendance::AttendanceStatus;
use crate::month::YearMonth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    ConflictWorkHasTravel,
    MissingTravelForTripStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRow {
    pub id: String,
    pub date: NaiveDate,
    pub employee_name: String,
    pub department_path: Vec<String>,
    pub kind: AnomalyKind,
    pub detail: String,
    pub attendance_status: Option<AttendanceStatus>,
    pub source_month: YearMonth,
}
