//! Row-oriented persistence for attendance, travel, and anomaly rows, plus
//! upload and progress-task metadata: a `Mutex<Connection>` guarding a single
//! sqlite file, idempotent migrations run once at `open`, and one
//! hand-written method per query shape.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{EngineError, EngineResult};
use crate::models::anomaly::{AnomalyKind, AnomalyRow};
use crate::models::attendance::{AttendanceRow, AttendanceStatus};
use crate::models::progress::{ProgressStatus, ProgressStep, ProgressTask, ProgressUpdate};
use crate::models::travel::{TravelKind, TravelRow};
use crate::models::upload::UploadRecord;
use crate::month::YearMonth;

/// Bounded wait applied to a per-month lock before surfacing `StoreContention`.
/// Within this window a second writer for the same month blocks and then
/// proceeds as the last writer; only contention outlasting the window fails.
const MONTH_LOCK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
const MONTH_LOCK_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(20);

/// Which row kinds a `read_rows` call should return.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowKinds {
    pub attendance: bool,
    pub travel: bool,
    pub anomaly: bool,
}

impl RowKinds {
    pub fn all() -> Self {
        Self { attendance: true, travel: true, anomaly: true }
    }
}

#[derive(Debug, Default)]
pub struct RowSet {
    pub attendance: Vec<AttendanceRow>,
    pub travel: Vec<TravelRow>,
    pub anomaly: Vec<AnomalyRow>,
}

pub struct Store {
    conn: Mutex<Connection>,
    month_locks: Mutex<HashMap<YearMonth, Arc<std::sync::Mutex<()>>>>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
            month_locks: Mutex::new(HashMap::new()),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS attendance_rows (
                source_month    TEXT NOT NULL,
                date            TEXT NOT NULL,
                employee_name   TEXT NOT NULL,
                department_path TEXT NOT NULL,
                status          TEXT NOT NULL,
                work_hours      REAL NOT NULL,
                checkout_time   TEXT,
                PRIMARY KEY (source_month, employee_name, date)
            );
            CREATE INDEX IF NOT EXISTS idx_attendance_month ON attendance_rows(source_month);

            CREATE TABLE IF NOT EXISTS travel_rows (
                id                   TEXT PRIMARY KEY,
                source_month         TEXT NOT NULL,
                kind                 TEXT NOT NULL CHECK(kind IN ('FLIGHT','HOTEL','TRAIN')),
                event_date           TEXT NOT NULL,
                booker_name          TEXT NOT NULL,
                traveller_name       TEXT NOT NULL,
                department_path      TEXT NOT NULL,
                amount               REAL NOT NULL,
                project_code         TEXT,
                project_name         TEXT,
                advance_days         INTEGER NOT NULL,
                is_over_standard     INTEGER NOT NULL,
                over_standard_reason TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_travel_month ON travel_rows(source_month);

            CREATE TABLE IF NOT EXISTS anomaly_rows (
                id                TEXT PRIMARY KEY,
                source_month      TEXT NOT NULL,
                date              TEXT NOT NULL,
                employee_name     TEXT NOT NULL,
                department_path   TEXT NOT NULL,
                kind              TEXT NOT NULL,
                detail            TEXT NOT NULL,
                attendance_status TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_anomaly_month ON anomaly_rows(source_month);

            CREATE TABLE IF NOT EXISTS uploads (
                id                TEXT PRIMARY KEY,
                file_name         TEXT NOT NULL,
                file_path         TEXT NOT NULL,
                file_size         INTEGER NOT NULL,
                uploaded_at       TEXT NOT NULL,
                months_covered    TEXT NOT NULL,
                parsed            INTEGER NOT NULL,
                last_analysed_at  TEXT
            );

            CREATE TABLE IF NOT EXISTS progress_tasks (
                task_id       TEXT PRIMARY KEY,
                file_name     TEXT NOT NULL,
                status        TEXT NOT NULL,
                progress      INTEGER NOT NULL,
                current_step  TEXT NOT NULL,
                steps         TEXT NOT NULL,
                error         TEXT,
                terminal_at   TEXT
            );
            ",
        )?;
        Ok(())
    }

    fn month_lock(&self, month: YearMonth) -> Arc<std::sync::Mutex<()>> {
        self.month_locks
            .lock()
            .unwrap()
            .entry(month)
            .or_insert_with(|| Arc::new(std::sync::Mutex::new(())))
            .clone()
    }

    /// Blocks the calling thread until `lock` is acquired or `MONTH_LOCK_TIMEOUT`
    /// elapses, polling at `MONTH_LOCK_POLL_INTERVAL`. Concurrent writers to the
    /// same month are serialised this way rather than failing the second writer
    /// outright; only a writer that is still blocked past the deadline sees
    /// `StoreContention`.
    fn acquire_month_lock<'a>(
        lock: &'a std::sync::Mutex<()>,
        month: YearMonth,
    ) -> EngineResult<std::sync::MutexGuard<'a, ()>> {
        let deadline = std::time::Instant::now() + MONTH_LOCK_TIMEOUT;
        loop {
            match lock.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(std::sync::TryLockError::Poisoned(e)) => return Ok(e.into_inner()),
                Err(std::sync::TryLockError::WouldBlock) => {
                    if std::time::Instant::now() >= deadline {
                        return Err(EngineError::StoreContention(month.to_string()));
                    }
                    std::thread::sleep(MONTH_LOCK_POLL_INTERVAL);
                }
            }
        }
    }

    // ── Month-scoped writes ──

    pub fn replace_month(
        &self,
        month: YearMonth,
        attendance: &[AttendanceRow],
        travel: &[TravelRow],
        anomalies: &[AnomalyRow],
    ) -> EngineResult<()> {
        let lock = self.month_lock(month);
        let _guard = Self::acquire_month_lock(&lock, month)?;

        let month_tag = month.to_string();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM attendance_rows WHERE source_month = ?1", params![month_tag])?;
        tx.execute("DELETE FROM travel_rows WHERE source_month = ?1", params![month_tag])?;
        tx.execute("DELETE FROM anomaly_rows WHERE source_month = ?1", params![month_tag])?;

        for a in attendance {
            tx.execute(
                "INSERT INTO attendance_rows (source_month, date, employee_name, department_path, status, work_hours, checkout_time) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    month_tag,
                    a.date.to_string(),
                    a.employee_name,
                    encode_path(&a.department_path),
                    encode_status(a.status),
                    a.work_hours,
                    a.checkout_time.map(|t| t.to_string()),
                ],
            )?;
        }

        for t in travel {
            tx.execute(
                "INSERT INTO travel_rows (id, source_month, kind, event_date, booker_name, traveller_name, \
                 department_path, amount, project_code, project_name, advance_days, is_over_standard, over_standard_reason) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    t.id,
                    month_tag,
                    t.kind.as_str(),
                    t.event_date.to_string(),
                    t.booker_name,
                    t.traveller_name,
                    encode_path(&t.department_path),
                    t.amount,
                    t.project_code,
                    t.project_name,
                    t.advance_days,
                    t.is_over_standard as i64,
                    t.over_standard_reason,
                ],
            )?;
        }

        for a in anomalies {
            tx.execute(
                "INSERT INTO anomaly_rows (id, source_month, date, employee_name, department_path, kind, detail, attendance_status) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    a.id,
                    month_tag,
                    a.date.to_string(),
                    a.employee_name,
                    encode_path(&a.department_path),
                    encode_anomaly_kind(a.kind),
                    a.detail,
                    a.attendance_status.map(encode_status),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn delete_month(&self, month: YearMonth) -> EngineResult<()> {
        let lock = self.month_lock(month);
        let _guard = Self::acquire_month_lock(&lock, month)?;

        let month_tag = month.to_string();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM attendance_rows WHERE source_month = ?1", params![month_tag])?;
        tx.execute("DELETE FROM travel_rows WHERE source_month = ?1", params![month_tag])?;
        tx.execute("DELETE FROM anomaly_rows WHERE source_month = ?1", params![month_tag])?;

        let mut uploads: Vec<UploadRecord> = {
            let mut stmt = tx.prepare(
                "SELECT id, file_name, file_path, file_size, uploaded_at, months_covered, parsed, last_analysed_at FROM uploads",
            )?;
            stmt.query_map([], row_to_upload)?.collect::<Result<Vec<_>, _>>()?
        };

        let mut emptied_paths = Vec::new();
        for record in &mut uploads {
            let before = record.months_covered.len();
            record.months_covered.retain(|m| *m != month);
            if record.months_covered.len() != before {
                if record.months_covered.is_empty() {
                    tx.execute("DELETE FROM uploads WHERE id = ?1", params![record.id])?;
                    emptied_paths.push(record.file_path.clone());
                } else {
                    tx.execute(
                        "UPDATE uploads SET months_covered = ?2 WHERE id = ?1",
                        params![record.id, encode_months(&record.months_covered)],
                    )?;
                }
            }
        }

        tx.commit()?;
        drop(conn);

        for path in emptied_paths {
            let _ = std::fs::remove_file(path);
        }
        Ok(())
    }

    // ── Reads ──

    pub fn read_rows(&self, months: &BTreeSet<YearMonth>, kinds: RowKinds) -> EngineResult<RowSet> {
        if months.is_empty() {
            return Ok(RowSet::default());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = months_placeholder(months.len());
        let params: Vec<String> = months.iter().map(|m| m.to_string()).collect();

        let mut out = RowSet::default();

        if kinds.attendance {
            let sql = format!(
                "SELECT date, employee_name, department_path, status, work_hours, checkout_time, source_month \
                 FROM attendance_rows WHERE source_month IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), row_to_attendance)?
                .collect::<Result<Vec<_>, _>>()?;
            out.attendance = rows;
        }

        if kinds.travel {
            let sql = format!(
                "SELECT id, kind, event_date, booker_name, traveller_name, department_path, amount, \
                 project_code, project_name, advance_days, is_over_standard, over_standard_reason, source_month \
                 FROM travel_rows WHERE source_month IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), row_to_travel)?
                .collect::<Result<Vec<_>, _>>()?;
            out.travel = rows;
        }

        if kinds.anomaly {
            let sql = format!(
                "SELECT id, date, employee_name, department_path, kind, detail, attendance_status, source_month \
                 FROM anomaly_rows WHERE source_month IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), row_to_anomaly)?
                .collect::<Result<Vec<_>, _>>()?;
            out.anomaly = rows;
        }

        Ok(out)
    }

    pub fn list_months(&self) -> EngineResult<Vec<YearMonth>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT source_month FROM attendance_rows \
             UNION SELECT source_month FROM travel_rows \
             UNION SELECT source_month FROM anomaly_rows \
             ORDER BY source_month ASC",
        )?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut out: Vec<YearMonth> = rows
            .into_iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        out.sort();
        Ok(out)
    }

    // ── Uploads ──

    pub fn upload_upsert(&self, record: &UploadRecord) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO uploads (id, file_name, file_path, file_size, uploaded_at, months_covered, parsed, last_analysed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(id) DO UPDATE SET \
               file_name = excluded.file_name, file_path = excluded.file_path, file_size = excluded.file_size, \
               uploaded_at = excluded.uploaded_at, months_covered = excluded.months_covered, \
               parsed = excluded.parsed, last_analysed_at = excluded.last_analysed_at",
            params![
                record.id,
                record.file_name,
                record.file_path,
                record.file_size as i64,
                record.uploaded_at.to_rfc3339(),
                encode_months(&record.months_covered),
                record.parsed as i64,
                record.last_analysed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn upload_list(&self) -> EngineResult<Vec<UploadRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, file_name, file_path, file_size, uploaded_at, months_covered, parsed, last_analysed_at \
             FROM uploads ORDER BY uploaded_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_upload)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Progress tasks ──

    pub fn progress_create(&self, task_id: &str, file_name: &str) -> EngineResult<()> {
        self.sweep_expired_progress()?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO progress_tasks (task_id, file_name, status, progress, current_step, steps, error, terminal_at) \
             VALUES (?1, ?2, 'UPLOADING', 0, 'accepted', '[]', NULL, NULL)",
            params![task_id, file_name],
        )?;
        Ok(())
    }

    pub fn progress_update(&self, task_id: &str, update: ProgressUpdate) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        let existing_steps: String = conn
            .query_row(
                "SELECT steps FROM progress_tasks WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or_else(|| "[]".to_string());
        let mut steps: Vec<ProgressStep> = serde_json::from_str(&existing_steps).unwrap_or_default();
        steps.push(ProgressStep {
            label: update.step_label.clone(),
            completed_at: Utc::now(),
        });

        let terminal_at = if update.status.is_terminal() {
            Some(Utc::now().to_rfc3339())
        } else {
            None
        };

        conn.execute(
            "UPDATE progress_tasks SET status = ?2, progress = ?3, current_step = ?4, steps = ?5, error = ?6, terminal_at = ?7 \
             WHERE task_id = ?1",
            params![
                task_id,
                encode_progress_status(update.status),
                update.progress as i64,
                update.step_label,
                serde_json::to_string(&steps).unwrap(),
                update.error,
                terminal_at,
            ],
        )?;
        Ok(())
    }

    pub fn progress_get(&self, task_id: &str) -> EngineResult<Option<ProgressTask>> {
        self.sweep_expired_progress()?;
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT task_id, file_name, status, progress, current_step, steps, error FROM progress_tasks WHERE task_id = ?1",
            params![task_id],
            row_to_progress,
        )
        .optional()
        .map_err(EngineError::from)
    }

    /// Expires progress rows 1 hour past a terminal state. Called lazily on
    /// create/get and also by the periodic background sweep (§5).
    pub fn sweep_expired_progress(&self) -> EngineResult<()> {
        let cutoff = (Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM progress_tasks WHERE terminal_at IS NOT NULL AND terminal_at < ?1",
            params![cutoff],
        )?;
        Ok(())
    }
}

fn months_placeholder(n: usize) -> String {
    std::iter::repeat("?")
        .take(n)
        .collect::<Vec<_>>()
        .join(", ")
}

fn encode_path(path: &[String]) -> String {
    serde_json::to_string(path).unwrap()
}

fn decode_path(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn encode_months(months: &[YearMonth]) -> String {
    serde_json::to_string(&months.iter().map(|m| m.to_string()).collect::<Vec<_>>()).unwrap()
}

fn decode_months(raw: &str) -> Vec<YearMonth> {
    serde_json::from_str::<Vec<String>>(raw)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|s| s.parse().ok())
        .collect()
}

fn encode_status(status: AttendanceStatus) -> &'static str {
    match status {
        AttendanceStatus::Work => "WORK",
        AttendanceStatus::WeekendWork => "WEEKEND_WORK",
        AttendanceStatus::Travel => "TRAVEL",
        AttendanceStatus::Leave => "LEAVE",
        AttendanceStatus::Unknown => "UNKNOWN",
    }
}

fn decode_status(raw: &str) -> AttendanceStatus {
    match raw {
        "WORK" => AttendanceStatus::Work,
        "WEEKEND_WORK" => AttendanceStatus::WeekendWork,
        "TRAVEL" => AttendanceStatus::Travel,
        "LEAVE" => AttendanceStatus::Leave,
        _ => AttendanceStatus::Unknown,
    }
}

fn encode_anomaly_kind(kind: AnomalyKind) -> &'static str {
    match kind {
        AnomalyKind::ConflictWorkHasTravel => "CONFLICT_WORK_HAS_TRAVEL",
        AnomalyKind::MissingTravelForTripStatus => "MISSING_TRAVEL_FOR_TRIP_STATUS",
    }
}

fn decode_anomaly_kind(raw: &str) -> AnomalyKind {
    match raw {
        "CONFLICT_WORK_HAS_TRAVEL" => AnomalyKind::ConflictWorkHasTravel,
        _ => AnomalyKind::MissingTravelForTripStatus,
    }
}

fn decode_kind(raw: &str) -> TravelKind {
    match raw {
        "FLIGHT" => TravelKind::Flight,
        "HOTEL" => TravelKind::Hotel,
        _ => TravelKind::Train,
    }
}

fn encode_progress_status(status: ProgressStatus) -> &'static str {
    match status {
        ProgressStatus::Uploading => "UPLOADING",
        ProgressStatus::Processing => "PROCESSING",
        ProgressStatus::Completed => "COMPLETED",
        ProgressStatus::Failed => "FAILED",
    }
}

fn decode_progress_status(raw: &str) -> ProgressStatus {
    match raw {
        "UPLOADING" => ProgressStatus::Uploading,
        "PROCESSING" => ProgressStatus::Processing,
        "COMPLETED" => ProgressStatus::Completed,
        _ => ProgressStatus::Failed,
    }
}

fn row_to_attendance(row: &rusqlite::Row) -> rusqlite::Result<AttendanceRow> {
    let date: String = row.get(0)?;
    let checkout: Option<String> = row.get(5)?;
    let source_month: String = row.get(6)?;
    Ok(AttendanceRow {
        date: date.parse().unwrap(),
        employee_name: row.get(1)?,
        department_path: decode_path(&row.get::<_, String>(2)?),
        status: decode_status(&row.get::<_, String>(3)?),
        work_hours: row.get(4)?,
        checkout_time: checkout.and_then(|s| s.parse().ok()),
        source_month: source_month.parse().unwrap(),
    })
}

fn row_to_travel(row: &rusqlite::Row) -> rusqlite::Result<TravelRow> {
    let event_date: String = row.get(2)?;
    let source_month: String = row.get(12)?;
    Ok(TravelRow {
        id: row.get(0)?,
        kind: decode_kind(&row.get::<_, String>(1)?),
        event_date: event_date.parse().unwrap(),
        booker_name: row.get(3)?,
        traveller_name: row.get(4)?,
        department_path: decode_path(&row.get::<_, String>(5)?),
        amount: row.get(6)?,
        project_code: row.get(7)?,
        project_name: row.get(8)?,
        advance_days: row.get(9)?,
        is_over_standard: row.get::<_, i64>(10)? != 0,
        over_standard_reason: row.get(11)?,
        source_month: source_month.parse().unwrap(),
    })
}

fn row_to_anomaly(row: &rusqlite::Row) -> rusqlite::Result<AnomalyRow> {
    let date: String = row.get(1)?;
    let attendance_status: Option<String> = row.get(6)?;
    let source_month: String = row.get(7)?;
    Ok(AnomalyRow {
        id: row.get(0)?,
        date: date.parse().unwrap(),
        employee_name: row.get(2)?,
        department_path: decode_path(&row.get::<_, String>(3)?),
        kind: decode_anomaly_kind(&row.get::<_, String>(4)?),
        detail: row.get(5)?,
        attendance_status: attendance_status.map(|s| decode_status(&s)),
        source_month: source_month.parse().unwrap(),
    })
}

fn row_to_upload(row: &rusqlite::Row) -> rusqlite::Result<UploadRecord> {
    let uploaded_at: String = row.get(4)?;
    let last_analysed_at: Option<String> = row.get(7)?;
    Ok(UploadRecord {
        id: row.get(0)?,
        file_name: row.get(1)?,
        file_path: row.get(2)?,
        file_size: row.get::<_, i64>(3)? as u64,
        uploaded_at: DateTime::parse_from_rfc3339(&uploaded_at).unwrap().with_timezone(&Utc),
        months_covered: decode_months(&row.get::<_, String>(5)?),
        parsed: row.get::<_, i64>(6)? != 0,
        last_analysed_at: last_analysed_at
            .map(|s| DateTime::parse_from_rfc3339(&s).unwrap().with_timezone(&Utc)),
    })
}

fn row_to_progress(row: &rusqlite::Row) -> rusqlite::Result<ProgressTask> {
    let status: String = row.get(2)?;
    let steps: String = row.get(5)?;
    Ok(ProgressTask {
        task_id: row.get(0)?,
        file_name: row.get(1)?,
        status: decode_progress_status(&status),
        progress: row.get::<_, i64>(3)? as u8,
        current_step: row.get(4)?,
        steps: serde_json::from_str(&steps).unwrap_or_default(),
        error: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_attendance(month: YearMonth, day: u32, name: &str) -> AttendanceRow {
        AttendanceRow {
            date: NaiveDate::from_ymd_opt(month.year, month.month, day).unwrap(),
            employee_name: name.to_string(),
            department_path: vec!["研发".to_string()],
            status: AttendanceStatus::Work,
            work_hours: 8.0,
            checkout_time: None,
            source_month: month,
        }
    }

    fn sample_travel(month: YearMonth, day: u32, amount: f64) -> TravelRow {
        TravelRow {
            id: uuid::Uuid::new_v4().to_string(),
            kind: TravelKind::Flight,
            event_date: NaiveDate::from_ymd_opt(month.year, month.month, day).unwrap(),
            booker_name: "张三".to_string(),
            traveller_name: "张三".to_string(),
            department_path: vec!["研发".to_string()],
            amount,
            project_code: None,
            project_name: None,
            advance_days: 0,
            is_over_standard: false,
            over_standard_reason: String::new(),
            source_month: month,
        }
    }

    fn temp_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("engine.db")).unwrap();
        (store, dir)
    }

    #[test]
    fn replay_is_idempotent() {
        let (store, _dir) = temp_store();
        let month: YearMonth = "2025-08".parse().unwrap();
        let attendance = vec![sample_attendance(month, 1, "张三")];
        let travel = vec![sample_travel(month, 1, 1000.0)];

        store.replace_month(month, &attendance, &travel, &[]).unwrap();
        store.replace_month(month, &attendance, &travel, &[]).unwrap();

        let months = BTreeSet::from([month]);
        let rows = store.read_rows(&months, RowKinds::all()).unwrap();
        assert_eq!(rows.attendance.len(), 1);
        assert_eq!(rows.travel.len(), 1);
    }

    #[test]
    fn per_month_isolation_regardless_of_ingest_order() {
        let (store_a, _d1) = temp_store();
        let (store_b, _d2) = temp_store();
        let m1: YearMonth = "2025-01".parse().unwrap();
        let m2: YearMonth = "2025-02".parse().unwrap();

        store_a.replace_month(m1, &[sample_attendance(m1, 1, "A")], &[sample_travel(m1, 1, 100.0)], &[]).unwrap();
        store_a.replace_month(m2, &[sample_attendance(m2, 1, "B")], &[sample_travel(m2, 1, 200.0)], &[]).unwrap();

        store_b.replace_month(m2, &[sample_attendance(m2, 1, "B")], &[sample_travel(m2, 1, 200.0)], &[]).unwrap();
        store_b.replace_month(m1, &[sample_attendance(m1, 1, "A")], &[sample_travel(m1, 1, 100.0)], &[]).unwrap();

        assert_eq!(store_a.list_months().unwrap(), store_b.list_months().unwrap());
    }

    #[test]
    fn delete_month_removes_all_row_kinds_and_the_month_listing() {
        let (store, _dir) = temp_store();
        let month: YearMonth = "2025-08".parse().unwrap();
        store.replace_month(month, &[sample_attendance(month, 1, "张三")], &[sample_travel(month, 1, 1000.0)], &[]).unwrap();

        store.delete_month(month).unwrap();

        assert!(!store.list_months().unwrap().contains(&month));
        let rows = store.read_rows(&BTreeSet::from([month]), RowKinds::all()).unwrap();
        assert!(rows.attendance.is_empty());
        assert!(rows.travel.is_empty());
        assert!(rows.anomaly.is_empty());
    }

    #[test]
    fn concurrent_writes_to_same_month_serialise_instead_of_erroring() {
        let (store, _dir) = temp_store();
        let month: YearMonth = "2025-08".parse().unwrap();

        std::thread::scope(|scope| {
            for name in ["张三", "李四"] {
                let store = &store;
                scope.spawn(move || {
                    store
                        .replace_month(month, &[sample_attendance(month, 1, name)], &[], &[])
                        .unwrap();
                });
            }
        });

        // Both writers ran to completion (no StoreContention) and the loser of the
        // race left exactly its own month intact rather than a merged or empty one.
        let rows = store.read_rows(&BTreeSet::from([month]), RowKinds::all()).unwrap();
        assert_eq!(rows.attendance.len(), 1);
    }

    #[test]
    fn delete_month_shrinks_upload_records_and_removes_empty_ones() {
        let (store, dir) = temp_store();
        let month: YearMonth = "2025-08".parse().unwrap();
        let other: YearMonth = "2025-09".parse().unwrap();
        store.replace_month(month, &[sample_attendance(month, 1, "张三")], &[], &[]).unwrap();
        store.replace_month(other, &[sample_attendance(other, 1, "张三")], &[], &[]).unwrap();

        let blob_path = dir.path().join("upload.xlsx");
        std::fs::write(&blob_path, b"fake").unwrap();
        store.upload_upsert(&UploadRecord {
            id: "u1".to_string(),
            file_name: "upload.xlsx".to_string(),
            file_path: blob_path.to_string_lossy().to_string(),
            file_size: 4,
            uploaded_at: Utc::now(),
            months_covered: vec![month],
            parsed: true,
            last_analysed_at: None,
        }).unwrap();
        store.upload_upsert(&UploadRecord {
            id: "u2".to_string(),
            file_name: "upload2.xlsx".to_string(),
            file_path: dir.path().join("upload2.xlsx").to_string_lossy().to_string(),
            file_size: 4,
            uploaded_at: Utc::now(),
            months_covered: vec![month, other],
            parsed: true,
            last_analysed_at: None,
        }).unwrap();

        store.delete_month(month).unwrap();

        let uploads = store.upload_list().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].id, "u2");
        assert_eq!(uploads[0].months_covered, vec![other]);
        assert!(!blob_path.exists());
    }
}
