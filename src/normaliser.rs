//! Parses a raw travel-and-attendance workbook into typed, cleaned rows.
//!
//! Grounded in the column-accessor idiom from `abacus_depreciation`'s Excel
//! importer and `PDW_RST`'s sheet-driven ETL: pull each column by index with a
//! small family of `get_*` helpers, skip the header row, and turn every
//! row-level defect into a warning rather than a hard failure.

use std::collections::BTreeSet;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use std::sync::OnceLock;

use crate::models::attendance::{AttendanceRow, AttendanceStatus};
use crate::models::travel::{TravelKind, TravelRow};
use crate::month::YearMonth;

/// Candidate sheet-name aliases tried in order before falling back to
/// positional order `[attendance, flight, hotel, train]` (§4.1, Open Question d).
const ATTENDANCE_ALIASES: &[&str] = &["考勤", "考勤表", "考勤状态", "attendance"];
const FLIGHT_ALIASES: &[&str] = &["机票", "飞机", "flight"];
const HOTEL_ALIASES: &[&str] = &["酒店", "住宿", "hotel"];
const TRAIN_ALIASES: &[&str] = &["火车", "火车票", "train"];

#[derive(Debug, Clone)]
pub enum NormaliserWarning {
    UnknownStatus { sheet: &'static str, row: usize, text: String },
    UnparseableDate { sheet: &'static str, row: usize },
    MissingEmployeeName { sheet: &'static str, row: usize },
}

#[derive(Debug, Default)]
pub struct NormalisedFrames {
    pub attendance: Vec<AttendanceRow>,
    pub travel: Vec<TravelRow>,
    pub months_covered: BTreeSet<YearMonth>,
}

/// Parses the four required sheets out of a workbook on disk.
///
/// Fails only if the workbook cannot be opened or is missing one of the four
/// required sheets — everything else is a `NormaliserWarning`.
pub fn parse_workbook(
    path: impl AsRef<Path>,
) -> anyhow::Result<(NormalisedFrames, Vec<NormaliserWarning>)> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| anyhow::anyhow!("workbook unreadable: {e}"))?;

    let sheet_names = workbook.sheet_names().to_vec();
    if sheet_names.len() < 4 {
        anyhow::bail!(
            "workbook has {} sheet(s), need at least 4 (attendance, flight, hotel, train)",
            sheet_names.len()
        );
    }

    let attendance_sheet = pick_sheet(&sheet_names, ATTENDANCE_ALIASES, 0)?;
    let flight_sheet = pick_sheet(&sheet_names, FLIGHT_ALIASES, 1)?;
    let hotel_sheet = pick_sheet(&sheet_names, HOTEL_ALIASES, 2)?;
    let train_sheet = pick_sheet(&sheet_names, TRAIN_ALIASES, 3)?;

    let mut warnings = Vec::new();
    let mut frames = NormalisedFrames::default();

    let range = workbook
        .worksheet_range(&attendance_sheet)
        .map_err(|e| anyhow::anyhow!("reading attendance sheet: {e}"))?;
    parse_attendance_sheet(&range, &mut frames, &mut warnings);

    for (sheet_name, kind) in [
        (flight_sheet, TravelKind::Flight),
        (hotel_sheet, TravelKind::Hotel),
        (train_sheet, TravelKind::Train),
    ] {
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| anyhow::anyhow!("reading {sheet_name} sheet: {e}"))?;
        parse_travel_sheet(&range, kind, &mut frames, &mut warnings);
    }

    Ok((frames, warnings))
}

fn pick_sheet(
    sheet_names: &[String],
    aliases: &[&str],
    positional_fallback: usize,
) -> anyhow::Result<String> {
    for alias in aliases {
        if let Some(found) = sheet_names
            .iter()
            .find(|name| name.to_lowercase().contains(&alias.to_lowercase()))
        {
            return Ok(found.clone());
        }
    }
    sheet_names
        .get(positional_fallback)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("workbook is missing a required sheet"))
}

fn cell_string(row: &[Data], idx: usize) -> Option<String> {
    row.get(idx).and_then(|c| match c {
        Data::String(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn cell_float(row: &[Data], idx: usize) -> Option<f64> {
    row.get(idx).and_then(|c| match c {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => parse_money(s).into(),
        _ => None,
    })
}

fn cell_int(row: &[Data], idx: usize) -> Option<i64> {
    row.get(idx).and_then(|c| match c {
        Data::Int(i) => Some(*i),
        Data::Float(f) => Some(*f as i64),
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn cell_bool(row: &[Data], idx: usize) -> bool {
    match row.get(idx) {
        Some(Data::Bool(b)) => *b,
        Some(Data::String(s)) => {
            matches!(s.trim(), "1" | "true" | "True" | "TRUE" | "是" | "Y" | "y")
        }
        Some(Data::Int(i)) => *i != 0,
        Some(Data::Float(f)) => *f != 0.0,
        _ => false,
    }
}

fn cell_date(row: &[Data], idx: usize) -> Option<NaiveDate> {
    match row.get(idx) {
        Some(Data::DateTime(dt)) => {
            let days = dt.as_f64() as i64;
            excel_serial_to_date(days)
        }
        Some(Data::DateTimeIso(s)) => parse_date(s),
        Some(Data::String(s)) => parse_date(s),
        Some(Data::Int(i)) => excel_serial_to_date(*i),
        Some(Data::Float(f)) => excel_serial_to_date(*f as i64),
        _ => None,
    }
}

fn cell_time(row: &[Data], idx: usize) -> Option<NaiveTime> {
    match row.get(idx) {
        Some(Data::DateTime(dt)) => {
            let frac_day = dt.as_f64().fract();
            seconds_to_time((frac_day * 86_400.0).round() as i64)
        }
        Some(Data::String(s)) => parse_time(s),
        _ => None,
    }
}

fn excel_serial_to_date(serial: i64) -> Option<NaiveDate> {
    // Excel's epoch is 1899-12-30 (accounting for the historical leap-year bug).
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(chrono::Duration::days(serial))
}

fn seconds_to_time(secs: i64) -> Option<NaiveTime> {
    let secs = secs.rem_euclid(86_400) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, 0)
}

/// Accepts ISO (`YYYY-MM-DD`) and slash (`YYYY/MM/DD`) forms.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y/%m/%d"))
        .ok()
}

pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

/// Accepts `¥1,234.56`, `1,234.56`, `1234`, or blank. Thousand separators are
/// dropped; blank and non-numeric values become `0`.
pub fn parse_money(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().unwrap_or(0.0)
}

const DEPARTMENT_DELIMS: &[char] = &['/', '\\', '-', '>'];

/// Splits a collapsed department path string, trims tokens, drops empties,
/// and clamps to the first three tokens from root.
pub fn parse_department_path(raw: &str) -> Vec<String> {
    let tokens: Vec<String> = raw
        .split(|c| DEPARTMENT_DELIMS.contains(&c))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .take(3)
        .collect();
    if tokens.is_empty() {
        vec!["未知".to_string()]
    } else {
        tokens
    }
}

fn project_field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d+)\s+(.*)$").unwrap())
}

/// Splits `<code> <name>` into `(code, name)`. Non-matching strings yield
/// `(None, Some(original))`; a fully blank string yields `(None, None)`.
pub fn parse_project_field(raw: &str) -> (Option<String>, Option<String>) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return (None, None);
    }
    match project_field_regex().captures(trimmed) {
        Some(caps) => {
            let code = caps.get(1).unwrap().as_str().to_string();
            let name = caps.get(2).unwrap().as_str().trim().to_string();
            let name = if name.is_empty() { None } else { Some(name) };
            (Some(code), name)
        }
        None => (None, Some(trimmed.to_string())),
    }
}

// Attendance sheet columns: date, employee name, department path, status, hours, checkout time.
const ATT_COL_DATE: usize = 0;
const ATT_COL_NAME: usize = 1;
const ATT_COL_DEPT: usize = 2;
const ATT_COL_STATUS: usize = 3;
const ATT_COL_HOURS: usize = 4;
const ATT_COL_CHECKOUT: usize = 5;

fn parse_attendance_sheet(
    range: &calamine::Range<Data>,
    frames: &mut NormalisedFrames,
    warnings: &mut Vec<NormaliserWarning>,
) {
    for (row_idx, row) in range.rows().enumerate().skip(1) {
        if row.iter().all(|c| c.is_empty()) {
            continue;
        }

        let Some(date) = cell_date(row, ATT_COL_DATE) else {
            warnings.push(NormaliserWarning::UnparseableDate {
                sheet: "attendance",
                row: row_idx,
            });
            continue;
        };

        let Some(employee_name) = cell_string(row, ATT_COL_NAME).map(|s| s.trim().to_string()) else {
            warnings.push(NormaliserWarning::MissingEmployeeName {
                sheet: "attendance",
                row: row_idx,
            });
            continue;
        };
        if employee_name.is_empty() {
            warnings.push(NormaliserWarning::MissingEmployeeName {
                sheet: "attendance",
                row: row_idx,
            });
            continue;
        }

        let department_path = cell_string(row, ATT_COL_DEPT)
            .map(|s| parse_department_path(&s))
            .unwrap_or_else(|| vec!["未知".to_string()]);

        let status_text = cell_string(row, ATT_COL_STATUS).unwrap_or_default();
        let status = AttendanceStatus::from_raw(&status_text);
        if status == AttendanceStatus::Unknown && !status_text.trim().is_empty() {
            warnings.push(NormaliserWarning::UnknownStatus {
                sheet: "attendance",
                row: row_idx,
                text: status_text.clone(),
            });
        }

        let work_hours = cell_float(row, ATT_COL_HOURS).unwrap_or(0.0).max(0.0);
        let checkout_time = cell_time(row, ATT_COL_CHECKOUT);
        let source_month = YearMonth::from_date(date);

        frames.months_covered.insert(source_month);
        frames.attendance.push(AttendanceRow {
            date,
            employee_name,
            department_path,
            status,
            work_hours,
            checkout_time,
            source_month,
        });
    }
}

// Travel sheet columns (flight/hotel/train share a layout):
// event date, booker, traveller, department path, amount, project field,
// advance days, over-standard flag, over-standard reason.
const TRV_COL_DATE: usize = 0;
const TRV_COL_BOOKER: usize = 1;
const TRV_COL_TRAVELLER: usize = 2;
const TRV_COL_DEPT: usize = 3;
const TRV_COL_AMOUNT: usize = 4;
const TRV_COL_PROJECT: usize = 5;
const TRV_COL_ADVANCE_DAYS: usize = 6;
const TRV_COL_OVER_STANDARD: usize = 7;
const TRV_COL_OVER_STANDARD_REASON: usize = 8;

fn parse_travel_sheet(
    range: &calamine::Range<Data>,
    kind: TravelKind,
    frames: &mut NormalisedFrames,
    warnings: &mut Vec<NormaliserWarning>,
) {
    let sheet_label: &'static str = match kind {
        TravelKind::Flight => "flight",
        TravelKind::Hotel => "hotel",
        TravelKind::Train => "train",
    };

    for (row_idx, row) in range.rows().enumerate().skip(1) {
        if row.iter().all(|c| c.is_empty()) {
            continue;
        }

        let Some(event_date) = cell_date(row, TRV_COL_DATE) else {
            warnings.push(NormaliserWarning::UnparseableDate {
                sheet: sheet_label,
                row: row_idx,
            });
            continue;
        };

        let booker_name = cell_string(row, TRV_COL_BOOKER)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let traveller_name = cell_string(row, TRV_COL_TRAVELLER)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| booker_name.clone());

        let department_path = cell_string(row, TRV_COL_DEPT)
            .map(|s| parse_department_path(&s))
            .unwrap_or_else(|| vec!["未知".to_string()]);

        let amount = cell_string(row, TRV_COL_AMOUNT)
            .map(|s| parse_money(&s))
            .or_else(|| cell_float(row, TRV_COL_AMOUNT))
            .unwrap_or(0.0)
            .max(0.0);

        let (project_code, project_name) = cell_string(row, TRV_COL_PROJECT)
            .map(|s| parse_project_field(&s))
            .unwrap_or((None, None));

        let advance_days = cell_int(row, TRV_COL_ADVANCE_DAYS).unwrap_or(0);
        let is_over_standard = cell_bool(row, TRV_COL_OVER_STANDARD);
        let over_standard_reason = cell_string(row, TRV_COL_OVER_STANDARD_REASON).unwrap_or_default();

        let source_month = YearMonth::from_date(event_date);
        frames.months_covered.insert(source_month);
        frames.travel.push(TravelRow {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            event_date,
            booker_name,
            traveller_name,
            department_path,
            amount,
            project_code,
            project_name,
            advance_days,
            is_over_standard,
            over_standard_reason,
            source_month,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_money_with_currency_and_thousands() {
        assert!((parse_money("¥1,234.56") - 1234.56).abs() < 1e-9);
        assert!((parse_money("1,234.56") - 1234.56).abs() < 1e-9);
        assert!((parse_money("1234") - 1234.0).abs() < 1e-9);
    }

    #[test]
    fn blank_or_non_numeric_money_is_zero() {
        assert_eq!(parse_money(""), 0.0);
        assert_eq!(parse_money("n/a"), 0.0);
    }

    #[test]
    fn parses_iso_and_slash_dates() {
        assert_eq!(
            parse_date("2025-08-01"),
            NaiveDate::from_ymd_opt(2025, 8, 1)
        );
        assert_eq!(
            parse_date("2025/08/01"),
            NaiveDate::from_ymd_opt(2025, 8, 1)
        );
        assert_eq!(parse_date("not-a-date"), None);
    }

    #[test]
    fn excel_serial_epoch_is_1899_12_30() {
        // Serial 1 is 1899-12-31 under the classic (leap-bug-preserving) epoch.
        assert_eq!(
            excel_serial_to_date(1),
            NaiveDate::from_ymd_opt(1899, 12, 31)
        );
        // A well-known serial: 45000 -> 2023-03-15.
        assert_eq!(
            excel_serial_to_date(45_000),
            NaiveDate::from_ymd_opt(2023, 3, 15)
        );
    }

    #[test]
    fn splits_department_path_on_any_delimiter_and_clamps_to_three() {
        assert_eq!(
            parse_department_path("研发/算法/NLP"),
            vec!["研发", "算法", "NLP"]
        );
        assert_eq!(
            parse_department_path("研发-算法>NLP\\深度"),
            vec!["研发", "算法", "NLP"]
        );
        assert_eq!(parse_department_path(""), vec!["未知"]);
        assert_eq!(parse_department_path("   "), vec!["未知"]);
    }

    #[test]
    fn parses_project_field_code_and_name() {
        assert_eq!(
            parse_project_field("10086 量子计算平台"),
            (Some("10086".to_string()), Some("量子计算平台".to_string()))
        );
        assert_eq!(
            parse_project_field("无编号项目"),
            (None, Some("无编号项目".to_string()))
        );
        assert_eq!(parse_project_field(""), (None, None));
        assert_eq!(parse_project_field("   "), (None, None));
    }
}
