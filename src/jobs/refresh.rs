// jobs/refresh.rs — Scheduled sprint refresh and its run status.
//
// One cycle force-refreshes the most recent sprint windows in order. A
// transient fetch failure skips that window and moves on; a fatal one
// abandons the rest of the cycle. Either way the cycle finishes by writing
// one terminal RunStatus row and never propagates an error to the
// scheduler loop around it.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::MetricsError;
use crate::retry::{retry_on_conflict, RetryConfig};
use crate::sprints::SprintCache;
use crate::storage::{is_write_conflict, Storage};

/// Name the refresh cycle writes its status under.
pub const REFRESH_JOB_NAME: &str = "sprint_refresh";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every window refreshed.
    Ok,
    /// Some windows refreshed, some failed.
    Partial,
    /// Nothing refreshed.
    Failed,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RunOutcome::Ok => "ok",
            RunOutcome::Partial => "partial",
            RunOutcome::Failed => "failed",
        }
    }

    fn parse(raw: &str) -> Result<Self, MetricsError> {
        match raw {
            "ok" => Ok(RunOutcome::Ok),
            "partial" => Ok(RunOutcome::Partial),
            "failed" => Ok(RunOutcome::Failed),
            other => Err(MetricsError::Validation(format!(
                "unknown run outcome '{other}'"
            ))),
        }
    }
}

/// Result of the most recent run of a named job. One row per job name,
/// replaced wholesale every run so no field survives from an earlier run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    pub name: String,
    pub status: RunOutcome,
    /// Unix seconds when the run began.
    pub ran_at: i64,
    /// Populated for failed outcomes only.
    pub error: Option<String>,
    pub succeeded_count: i64,
    pub failed_count: i64,
}

/// ok when nothing failed, failed when nothing succeeded, partial otherwise.
pub fn classify(succeeded: i64, failed: i64) -> RunOutcome {
    if failed == 0 {
        RunOutcome::Ok
    } else if succeeded == 0 {
        RunOutcome::Failed
    } else {
        RunOutcome::Partial
    }
}

/// Run one refresh cycle over the `window_count` most recent sprint
/// windows, current sprint last.
///
/// Never returns an error: every failure mode lands in the returned
/// [`RunStatus`], which is also persisted under [`REFRESH_JOB_NAME`].
pub async fn run_refresh_cycle(
    cache: &SprintCache,
    storage: &Storage,
    retry: &RetryConfig,
    window_count: usize,
) -> RunStatus {
    let ran_at = Utc::now().timestamp();
    let today = Utc::now().date_naive();

    let windows = match cache.calendar().recent(today, window_count) {
        Ok(windows) => windows,
        Err(e) => {
            // Failure before any per-sprint work began: abort immediately.
            warn!(err = %e, "sprint refresh could not enumerate windows");
            let status = RunStatus {
                name: REFRESH_JOB_NAME.to_string(),
                status: RunOutcome::Failed,
                ran_at,
                error: Some(e.to_string()),
                succeeded_count: 0,
                failed_count: 0,
            };
            persist_status(storage, retry, &status).await;
            return status;
        }
    };

    let mut succeeded = 0i64;
    let mut failed = 0i64;
    let mut last_error: Option<String> = None;

    for window in windows {
        match cache
            .get_or_load(window.start_date, window.end_date, true)
            .await
        {
            Ok(_) => succeeded += 1,
            Err(MetricsError::TransientFetch(msg)) => {
                failed += 1;
                warn!(
                    start = %window.start_date,
                    end = %window.end_date,
                    err = %msg,
                    "transient fetch failure, skipping sprint"
                );
                last_error = Some(msg);
            }
            Err(MetricsError::FatalFetch(msg)) => {
                failed += 1;
                warn!(
                    start = %window.start_date,
                    end = %window.end_date,
                    err = %msg,
                    "fatal fetch failure, abandoning rest of cycle"
                );
                last_error = Some(msg);
                break;
            }
            Err(e) => {
                failed += 1;
                warn!(
                    start = %window.start_date,
                    end = %window.end_date,
                    err = %e,
                    "sprint refresh failed, skipping sprint"
                );
                last_error = Some(e.to_string());
            }
        }
    }

    let outcome = classify(succeeded, failed);
    let status = RunStatus {
        name: REFRESH_JOB_NAME.to_string(),
        status: outcome,
        ran_at,
        error: if outcome == RunOutcome::Failed { last_error } else { None },
        succeeded_count: succeeded,
        failed_count: failed,
    };
    persist_status(storage, retry, &status).await;
    status
}

/// Best-effort status write: retries SQLite write conflicts, logs anything
/// else and moves on. The in-memory cycle result stands either way.
async fn persist_status(storage: &Storage, retry: &RetryConfig, status: &RunStatus) {
    let result = retry_on_conflict(retry, is_write_conflict, || put_run_status(storage, status)).await;
    if let Err(e) = result {
        warn!(err = %e, job = %status.name, "failed to persist run status");
    }
}

/// Overwrite the status row for `status.name`.
pub async fn put_run_status(storage: &Storage, status: &RunStatus) -> Result<(), MetricsError> {
    let pool = storage.pool();
    sqlx::query(
        r"INSERT INTO run_status (name, status, ran_at, error, succeeded_count, failed_count)
          VALUES (?1, ?2, ?3, ?4, ?5, ?6)
          ON CONFLICT(name) DO UPDATE SET
              status = excluded.status,
              ran_at = excluded.ran_at,
              error = excluded.error,
              succeeded_count = excluded.succeeded_count,
              failed_count = excluded.failed_count",
    )
    .bind(&status.name)
    .bind(status.status.as_str())
    .bind(status.ran_at)
    .bind(&status.error)
    .bind(status.succeeded_count)
    .bind(status.failed_count)
    .execute(&pool)
    .await?;
    Ok(())
}

/// Latest run status for `name`, if the job has ever completed a cycle.
pub async fn get_run_status(
    storage: &Storage,
    name: &str,
) -> Result<Option<RunStatus>, MetricsError> {
    let pool = storage.pool();
    let row: Option<(String, String, i64, Option<String>, i64, i64)> = sqlx::query_as(
        "SELECT name, status, ran_at, error, succeeded_count, failed_count
         FROM run_status WHERE name = ?1",
    )
    .bind(name)
    .fetch_optional(&pool)
    .await?;
    row.map(|(name, status, ran_at, error, succeeded_count, failed_count)| {
        Ok(RunStatus {
            name,
            status: RunOutcome::parse(&status)?,
            ran_at,
            error,
            succeeded_count,
            failed_count,
        })
    })
    .transpose()
}

/// Perpetual refresh loop: one cycle immediately, then one every
/// `interval_secs`. Spawn this during startup.
pub async fn run_refresh_loop(
    cache: Arc<SprintCache>,
    storage: Arc<Storage>,
    interval_secs: u64,
    window_count: usize,
) {
    info!(interval_secs, window_count, "sprint refresh loop started");
    if window_count == 0 {
        // Every cycle would classify as a vacuous ok without refreshing
        // anything. Legal, but almost certainly a misconfiguration.
        warn!("refresh window_count is 0, cycles will refresh no sprints");
    }
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
    loop {
        interval.tick().await;
        let status = run_refresh_cycle(&cache, &storage, &RetryConfig::default(), window_count).await;
        match status.status {
            RunOutcome::Ok => info!(
                succeeded = status.succeeded_count,
                "sprint refresh cycle complete"
            ),
            RunOutcome::Partial => warn!(
                succeeded = status.succeeded_count,
                failed = status.failed_count,
                "sprint refresh cycle partially failed"
            ),
            RunOutcome::Failed => warn!(
                failed = status.failed_count,
                error = ?status.error,
                "sprint refresh cycle failed"
            ),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
