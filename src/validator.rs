//! Cross-sheet validation: joins one month's attendance and travel rows to
//! surface expense/attendance inconsistencies. Pure, no I/O — the same shape
//! as a numeric core function factored out of a scheduling loop, just
//! expressing a rule join rather than a statistical model.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::anomaly::{AnomalyKind, AnomalyRow};
use crate::models::attendance::{AttendanceRow, AttendanceStatus};
use crate::models::travel::TravelRow;

#[derive(Debug, Clone)]
pub enum ValidatorWarning {
    MalformedAttendanceRow { index: usize },
}

struct Candidate {
    date: NaiveDate,
    employee_name: String,
    department_path: Vec<String>,
    kind: AnomalyKind,
    detail: String,
    attendance_status: Option<AttendanceStatus>,
}

/// Produces anomaly rows for one month's attendance/travel sets. Order of
/// enumeration of `attendance`/`travel` never affects the result: candidates
/// are always sorted by `(date, employee, rule)` before emission.
pub fn validate(attendance: &[AttendanceRow], travel: &[TravelRow]) -> (Vec<AnomalyRow>, Vec<ValidatorWarning>) {
    let mut warnings = Vec::new();

    // Index travel rows by traveller name (trimmed) for the conflict rule,
    // and keep the full list for the ±3-day window scan of the missing rule.
    let mut by_traveller: HashMap<&str, Vec<&TravelRow>> = HashMap::new();
    for t in travel {
        by_traveller
            .entry(t.traveller_name.trim())
            .or_default()
            .push(t);
    }

    let mut candidates: Vec<Candidate> = Vec::new();

    for (idx, a) in attendance.iter().enumerate() {
        let employee = a.employee_name.trim();
        if employee.is_empty() {
            warnings.push(ValidatorWarning::MalformedAttendanceRow { index: idx });
            continue;
        }

        match a.status {
            AttendanceStatus::Work | AttendanceStatus::WeekendWork => {
                if let Some(matches) = by_traveller.get(employee) {
                    let mut kinds: Vec<&str> = matches
                        .iter()
                        .filter(|t| t.event_date == a.date)
                        .map(|t| t.kind.as_str())
                        .collect();
                    if !kinds.is_empty() {
                        kinds.sort_unstable();
                        kinds.dedup();
                        candidates.push(Candidate {
                            date: a.date,
                            employee_name: employee.to_string(),
                            department_path: a.department_path.clone(),
                            kind: AnomalyKind::ConflictWorkHasTravel,
                            detail: format!("booked {} on a work day", kinds.join(", ")),
                            attendance_status: Some(a.status),
                        });
                    }
                }
            }
            AttendanceStatus::Travel => {
                let has_nearby_travel = by_traveller
                    .get(employee)
                    .map(|matches| {
                        matches
                            .iter()
                            .any(|t| (t.event_date - a.date).num_days().abs() <= 3)
                    })
                    .unwrap_or(false);
                if !has_nearby_travel {
                    candidates.push(Candidate {
                        date: a.date,
                        employee_name: employee.to_string(),
                        department_path: a.department_path.clone(),
                        kind: AnomalyKind::MissingTravelForTripStatus,
                        detail: "no travel booking within ±3 days of a TRAVEL attendance day".to_string(),
                        attendance_status: Some(a.status),
                    });
                }
            }
            AttendanceStatus::Leave | AttendanceStatus::Unknown => {}
        }
    }

    candidates.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.employee_name.cmp(&b.employee_name))
            .then_with(|| rule_order(a.kind).cmp(&rule_order(b.kind)))
    });

    // Collapse duplicates from the same (date, employee, kind).
    let mut rows: Vec<AnomalyRow> = Vec::new();
    for c in candidates {
        if let Some(last) = rows.last_mut() {
            if last.date == c.date && last.employee_name == c.employee_name && last.kind == c.kind {
                bump_collapse_count(&mut last.detail);
                continue;
            }
        }
        rows.push(AnomalyRow {
            id: uuid::Uuid::new_v4().to_string(),
            date: c.date,
            employee_name: c.employee_name,
            department_path: c.department_path,
            kind: c.kind,
            detail: c.detail,
            attendance_status: c.attendance_status,
            source_month: crate::month::YearMonth::from_date(c.date),
        });
    }

    (rows, warnings)
}

fn rule_order(kind: AnomalyKind) -> u8 {
    match kind {
        AnomalyKind::ConflictWorkHasTravel => 0,
        AnomalyKind::MissingTravelForTripStatus => 1,
    }
}

fn bump_collapse_count(detail: &mut String) {
    if let Some(pos) = detail.rfind(" (×") {
        if let Some(end) = detail[pos..].find(')') {
            let count_str = &detail[pos + 3..pos + end - 1];
            if let Ok(n) = count_str.parse::<u32>() {
                detail.truncate(pos);
                detail.push_str(&format!(" (×{} travel rows)", n + 1));
                return;
            }
        }
    }
    detail.push_str(" (×2 travel rows)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::travel::TravelKind;
    use crate::month::YearMonth;
    use chrono::NaiveDate;

    fn attendance(date: &str, name: &str, status: AttendanceStatus) -> AttendanceRow {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        AttendanceRow {
            date,
            employee_name: name.to_string(),
            department_path: vec!["行政部".to_string()],
            status,
            work_hours: 8.0,
            checkout_time: None,
            source_month: YearMonth::from_date(date),
        }
    }

    fn travel(date: &str, traveller: &str, kind: TravelKind, amount: f64) -> TravelRow {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        TravelRow {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            event_date: date,
            booker_name: traveller.to_string(),
            traveller_name: traveller.to_string(),
            department_path: vec!["行政部".to_string()],
            amount,
            project_code: None,
            project_name: None,
            advance_days: 0,
            is_over_standard: false,
            over_standard_reason: String::new(),
            source_month: YearMonth::from_date(date),
        }
    }

    #[test]
    fn conflict_detected_when_travel_on_work_day() {
        let a = vec![attendance("2025-08-01", "张三", AttendanceStatus::Work)];
        let t = vec![travel("2025-08-01", "张三", TravelKind::Flight, 2000.0)];
        let (anomalies, warnings) = validate(&a, &t);
        assert!(warnings.is_empty());
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::ConflictWorkHasTravel);
        assert_eq!(anomalies[0].employee_name, "张三");
    }

    #[test]
    fn missing_travel_within_tolerance_is_not_flagged() {
        let a = vec![attendance("2025-08-10", "李四", AttendanceStatus::Travel)];
        let t = vec![travel("2025-08-12", "李四", TravelKind::Hotel, 800.0)];
        let (anomalies, _) = validate(&a, &t);
        assert!(anomalies.is_empty());
    }

    #[test]
    fn missing_travel_beyond_tolerance_is_flagged() {
        let a = vec![attendance("2025-08-10", "李四", AttendanceStatus::Travel)];
        let t = vec![travel("2025-08-14", "李四", TravelKind::Hotel, 800.0)];
        let (anomalies, _) = validate(&a, &t);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::MissingTravelForTripStatus);
    }

    #[test]
    fn order_of_enumeration_does_not_affect_result() {
        let a1 = vec![
            attendance("2025-08-02", "赵六", AttendanceStatus::Work),
            attendance("2025-08-01", "张三", AttendanceStatus::Work),
        ];
        let a2 = vec![
            attendance("2025-08-01", "张三", AttendanceStatus::Work),
            attendance("2025-08-02", "赵六", AttendanceStatus::Work),
        ];
        let t = vec![
            travel("2025-08-01", "张三", TravelKind::Flight, 1000.0),
            travel("2025-08-02", "赵六", TravelKind::Train, 500.0),
        ];
        let (r1, _) = validate(&a1, &t);
        let (r2, _) = validate(&a2, &t);
        let key = |rows: &[AnomalyRow]| -> Vec<(NaiveDate, String, AnomalyKind)> {
            rows.iter()
                .map(|r| (r.date, r.employee_name.clone(), r.kind))
                .collect()
        };
        assert_eq!(key(&r1), key(&r2));
    }

    #[test]
    fn duplicates_collapse_into_one_row_with_count() {
        let a = vec![attendance("2025-08-01", "张三", AttendanceStatus::Work)];
        let t = vec![
            travel("2025-08-01", "张三", TravelKind::Flight, 1000.0),
            travel("2025-08-01", "张三", TravelKind::Hotel, 500.0),
        ];
        let (anomalies, _) = validate(&a, &t);
        assert_eq!(anomalies.len(), 1);
        assert!(anomalies[0].detail.contains("FLIGHT"));
        assert!(anomalies[0].detail.contains("HOTEL"));
    }
}
