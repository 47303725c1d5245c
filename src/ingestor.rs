//! Drives one uploaded workbook through Normaliser → Validator → Store as a
//! one-shot background task, reporting progress through `Store::progress_update`.
//! Spawned as a detached task, single-shot rather than an interval loop.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::models::anomaly::AnomalyRow;
use crate::models::attendance::AttendanceRow;
use crate::models::progress::{ProgressStatus, ProgressUpdate};
use crate::models::travel::TravelRow;
use crate::models::upload::UploadRecord;
use crate::month::YearMonth;
use crate::normaliser;
use crate::store::Store;
use crate::validator;

/// Spawns the ingestion of one already-received upload. Returns immediately;
/// the caller has already created the `ProgressTask` row and handed back
/// `task_id`. Step 1 and step 2 can be cancelled via `cancel`; from step 3
/// onward (per-month writes) cancellation is no longer checked to avoid a
/// partial-month commit.
pub fn spawn_ingestion(
    store: Arc<Store>,
    task_id: String,
    file_name: String,
    bytes: Vec<u8>,
    upload_dir: PathBuf,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        if let Err(e) = run_ingestion(&store, &task_id, &file_name, bytes, &upload_dir, &cancel).await {
            tracing::error!("ingestion {task_id} failed: {e:#}");
            let _ = store.progress_update(
                &task_id,
                ProgressUpdate {
                    status: ProgressStatus::Failed,
                    progress: 100,
                    step_label: "failed".to_string(),
                    error: Some(format!("{e:#}")),
                },
            );
        }
    });
}

async fn run_ingestion(
    store: &Store,
    task_id: &str,
    file_name: &str,
    bytes: Vec<u8>,
    upload_dir: &Path,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    // ── Step 1: persist the blob under a content-addressable name ──
    if cancel.is_cancelled() {
        return mark_cancelled(store, task_id);
    }
    store.progress_update(
        task_id,
        ProgressUpdate {
            status: ProgressStatus::Uploading,
            progress: 10,
            step_label: "persisting upload".to_string(),
            error: None,
        },
    )?;

    let uploaded_at = chrono::Utc::now();
    let digest = {
        let mut hasher = Sha256::new();
        hasher.update(file_name.as_bytes());
        hasher.update(uploaded_at.to_rfc3339().as_bytes());
        format!("{:x}", hasher.finalize())
    };
    let unique_name = &digest[..8];
    let stored_name = format!("{unique_name}_{file_name}");
    let stored_path = upload_dir.join(&stored_name);
    tokio::fs::create_dir_all(upload_dir).await?;
    tokio::fs::write(&stored_path, &bytes).await?;

    // ── Step 2: normalise ──
    if cancel.is_cancelled() {
        return mark_cancelled(store, task_id);
    }
    store.progress_update(
        task_id,
        ProgressUpdate {
            status: ProgressStatus::Processing,
            progress: 30,
            step_label: "parsing workbook".to_string(),
            error: None,
        },
    )?;

    let stored_path_clone = stored_path.clone();
    let parsed = tokio::task::spawn_blocking(move || normaliser::parse_workbook(&stored_path_clone))
        .await?
        .map_err(|e| anyhow::anyhow!("source invalid: {e}"))?;
    let (frames, warnings) = parsed;
    for w in &warnings {
        tracing::warn!("normaliser warning: {w:?}");
    }

    // From here on, not cancellable: step 3 begins.
    let months_covered = frames.months_covered.clone();
    let mut attendance_by_month: BTreeMap<YearMonth, Vec<AttendanceRow>> = BTreeMap::new();
    for row in frames.attendance {
        attendance_by_month.entry(row.source_month).or_default().push(row);
    }
    let mut travel_by_month: BTreeMap<YearMonth, Vec<TravelRow>> = BTreeMap::new();
    for row in frames.travel {
        travel_by_month.entry(row.source_month).or_default().push(row);
    }

    let total = months_covered.len().max(1);
    for (i, month) in months_covered.iter().enumerate() {
        let attendance = attendance_by_month.remove(month).unwrap_or_default();
        let travel = travel_by_month.remove(month).unwrap_or_default();

        let (anomalies, validator_warnings): (Vec<AnomalyRow>, _) = {
            let attendance = attendance.clone();
            let travel = travel.clone();
            tokio::task::spawn_blocking(move || validator::validate(&attendance, &travel)).await?
        };
        for w in &validator_warnings {
            tracing::warn!("validator warning: {w:?}");
        }

        tokio::task::block_in_place(|| store.replace_month(*month, &attendance, &travel, &anomalies))?;

        let progress = 30 + (60 * (i + 1) / total) as u8;
        store.progress_update(
            task_id,
            ProgressUpdate {
                status: ProgressStatus::Processing,
                progress,
                step_label: format!("stored month {month}"),
                error: None,
            },
        )?;
    }

    // ── Step 4: upsert UploadRecord ──
    store.progress_update(
        task_id,
        ProgressUpdate {
            status: ProgressStatus::Processing,
            progress: 95,
            step_label: "recording upload metadata".to_string(),
            error: None,
        },
    )?;

    let record = UploadRecord {
        id: uuid::Uuid::new_v4().to_string(),
        file_name: file_name.to_string(),
        file_path: stored_path.to_string_lossy().to_string(),
        file_size: bytes.len() as u64,
        uploaded_at,
        months_covered: months_covered.into_iter().collect(),
        parsed: true,
        last_analysed_at: Some(chrono::Utc::now()),
    };
    store.upload_upsert(&record)?;

    // ── Step 5: done ──
    store.progress_update(
        task_id,
        ProgressUpdate {
            status: ProgressStatus::Completed,
            progress: 100,
            step_label: "completed".to_string(),
            error: None,
        },
    )?;

    Ok(())
}

fn mark_cancelled(store: &Store, task_id: &str) -> anyhow::Result<()> {
    store.progress_update(
        task_id,
        ProgressUpdate {
            status: ProgressStatus::Failed,
            progress: 100,
            step_label: "cancelled".to_string(),
            error: Some("CANCELLED".to_string()),
        },
    )?;
    Ok(())
}

/// Background sweep that expires terminal `ProgressTask` rows: a delayed
/// start followed by a fixed-interval loop for the life of the process.
pub fn spawn_progress_sweep(store: Arc<Store>) {
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(5 * 60));
        loop {
            interval.tick().await;
            if let Err(e) = store.sweep_expired_progress() {
                tracing::error!("progress sweep error: {e}");
            }
        }
    });
}
