use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::month::YearMonth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Work,
    WeekendWork,
    Travel,
    Leave,
    Unknown,
}

impl AttendanceStatus {
    /// Maps the raw Chinese status text from the attendance sheet to the enum.
    pub fn from_raw(text: &str) -> Self {
        match text.trim() {
            "上班" => AttendanceStatus::Work,
            "公休日上班" | "周末加班" => AttendanceStatus::WeekendWork,
            "出差" => AttendanceStatus::Travel,
            "请假" | "年假" | "病假" | "事假" => AttendanceStatus::Leave,
            _ => AttendanceStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRow {
    pub date: NaiveDate,
    pub employee_name: String,
    pub department_path: Vec<String>,
    pub status: AttendanceStatus,
    pub work_hours: f64,
    pub checkout_time: Option<NaiveTime>,
    pub source_month: YearMonth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_status_text() {
        assert_eq!(AttendanceStatus::from_raw("上班"), AttendanceStatus::Work);
        assert_eq!(
            AttendanceStatus::from_raw("公休日上班"),
            AttendanceStatus::WeekendWork
        );
        assert_eq!(
            AttendanceStatus::from_raw("周末加班"),
            AttendanceStatus::WeekendWork
        );
        assert_eq!(AttendanceStatus::from_raw("出差"), AttendanceStatus::Travel);
        assert_eq!(AttendanceStatus::from_raw("请假"), AttendanceStatus::Leave);
        assert_eq!(AttendanceStatus::from_raw("年假"), AttendanceStatus::Leave);
        assert_eq!(AttendanceStatus::from_raw("病假"), AttendanceStatus::Leave);
        assert_eq!(AttendanceStatus::from_raw("事假"), AttendanceStatus::Leave);
    }

    #[test]
    fn unknown_status_text_falls_back() {
        assert_eq!(
            AttendanceStatus::from_raw("培训"),
            AttendanceStatus::Unknown
        );
        assert_eq!(AttendanceStatus::from_raw(""), AttendanceStatus::Unknown);
    }

    #[test]
    fn trims_whitespace_before_matching() {
        assert_eq!(AttendanceStatus::from_raw("  上班  "), AttendanceStatus::Work);
    }
}
