// storage/mod.rs — SQLite persistence for sprint records.
//
// Single-file WAL database. A sprint payload is stored as one JSON text
// column and replaced wholesale on every write, so a concurrent reader
// sees the old record or the new one, never a blend. Structural validation
// runs before the write; a rejected payload leaves the stored row intact.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{ConnectOptions, SqlitePool};
use tracing::{debug, info};

use crate::error::MetricsError;
use crate::sprints::record::{sprint_key, validate_payload, SprintPayload, SprintRecord};

/// Maximum time a monitoring query may take before being abandoned.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Wraps a future with the standard query timeout.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

/// Aggregate cache statistics for operational monitoring.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct StoreStats {
    pub entry_count: i64,
    /// Total stored payload bytes.
    pub total_bytes: i64,
    pub oldest_updated_at: Option<i64>,
    pub newest_updated_at: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SprintRow {
    sprint_key: String,
    start_date: String,
    end_date: String,
    data_json: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl SprintRow {
    fn into_record(self) -> Result<SprintRecord, MetricsError> {
        let start_date = parse_date(&self.start_date)?;
        let end_date = parse_date(&self.end_date)?;
        let payload = match self.data_json {
            Some(json) => Some(serde_json::from_str::<SprintPayload>(&json)?),
            None => None,
        };
        Ok(SprintRecord {
            sprint_key: self.sprint_key,
            start_date,
            end_date,
            payload,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, MetricsError> {
    raw.parse()
        .map_err(|_| MetricsError::Validation(format!("malformed date '{raw}' in sprint row")))
}

impl Storage {
    /// Open (creating if needed) the database under `data_dir`.
    ///
    /// `slow_query_ms` > 0 logs any statement slower than that threshold at
    /// WARN; 0 disables slow-statement logging.
    pub async fn open(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("creating data dir {}", data_dir.display()))?;
        let db_path = data_dir.join("sprintd.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);
        if slow_query_ms > 0 {
            opts = opts
                .log_slow_statements(log::LevelFilter::Warn, Duration::from_millis(slow_query_ms));
        }
        let pool = SqlitePool::connect_with(opts)
            .await
            .with_context(|| format!("opening database at {}", db_path.display()))?;
        Self::migrate(&pool).await?;
        info!(path = %db_path.display(), "sprint store opened");
        Ok(Self { pool })
    }

    /// In-memory database for tests. Pinned to a single connection so every
    /// handle sees the same data.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sprints (
                sprint_key TEXT PRIMARY KEY,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                data_json TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sprints_start_date ON sprints(start_date);

            CREATE TABLE IF NOT EXISTS run_status (
                name TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                ran_at INTEGER NOT NULL,
                error TEXT,
                succeeded_count INTEGER NOT NULL DEFAULT 0,
                failed_count INTEGER NOT NULL DEFAULT 0
            );
            ",
        )
        .execute(pool)
        .await
        .context("creating sprint tables")?;
        Ok(())
    }

    /// A clone of the underlying pool, for modules that run their own
    /// queries against the shared database.
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    /// Validate and persist a sprint payload, replacing any prior payload
    /// wholesale. `created_at` survives across upserts; `updated_at` is
    /// reset to now. Returns the stored record.
    pub async fn upsert_sprint(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        payload: &SprintPayload,
    ) -> Result<SprintRecord, MetricsError> {
        let value = serde_json::to_value(payload)?;
        self.upsert_sprint_json(start_date, end_date, &value).await
    }

    /// Raw-JSON variant of [`Storage::upsert_sprint`], the seam import and
    /// migration tooling writes through. Rejects structurally invalid
    /// payloads before touching the stored row.
    pub async fn upsert_sprint_json(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        payload: &serde_json::Value,
    ) -> Result<SprintRecord, MetricsError> {
        if start_date > end_date {
            return Err(MetricsError::Validation(format!(
                "sprint start {start_date} is after end {end_date}"
            )));
        }
        validate_payload(payload)?;
        let key = sprint_key(start_date, end_date);
        let now = Utc::now().timestamp();
        let row: SprintRow = sqlx::query_as(
            r"INSERT INTO sprints (sprint_key, start_date, end_date, data_json, created_at, updated_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?5)
              ON CONFLICT(sprint_key) DO UPDATE SET
                  data_json = excluded.data_json,
                  updated_at = excluded.updated_at
              RETURNING sprint_key, start_date, end_date, data_json, created_at, updated_at",
        )
        .bind(&key)
        .bind(start_date.to_string())
        .bind(end_date.to_string())
        .bind(payload.to_string())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        debug!(key = %key, "sprint record upserted");
        row.into_record()
    }

    /// The cached record for an exact window, if any.
    pub async fn get_sprint(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Option<SprintRecord>, MetricsError> {
        let key = sprint_key(start_date, end_date);
        let row: Option<SprintRow> = sqlx::query_as(
            "SELECT sprint_key, start_date, end_date, data_json, created_at, updated_at
             FROM sprints WHERE sprint_key = ?1",
        )
        .bind(&key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SprintRow::into_record).transpose()
    }

    /// All cached sprints, newest start date first.
    pub async fn list_sprints(&self) -> Result<Vec<SprintRecord>, MetricsError> {
        let rows: Vec<SprintRow> = sqlx::query_as(
            "SELECT sprint_key, start_date, end_date, data_json, created_at, updated_at
             FROM sprints ORDER BY start_date DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SprintRow::into_record).collect()
    }

    /// Drop one cached sprint. Returns whether a row existed.
    pub async fn delete_sprint(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<bool, MetricsError> {
        let key = sprint_key(start_date, end_date);
        let affected = sqlx::query("DELETE FROM sprints WHERE sprint_key = ?1")
            .bind(&key)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    /// Entry count, payload bytes, and update-time range of the cache.
    pub async fn stats(&self) -> Result<StoreStats> {
        with_timeout(async {
            let row: (i64, i64, Option<i64>, Option<i64>) = sqlx::query_as(
                r"SELECT COUNT(*), COALESCE(SUM(LENGTH(data_json)), 0),
                         MIN(updated_at), MAX(updated_at)
                  FROM sprints",
            )
            .fetch_one(&self.pool)
            .await
            .context("querying sprint store stats")?;
            Ok(StoreStats {
                entry_count: row.0,
                total_bytes: row.1,
                oldest_updated_at: row.2,
                newest_updated_at: row.3,
            })
        })
        .await
    }
}

/// Whether an error is a SQLite write conflict worth retrying (the database
/// or a table briefly locked by another writer).
pub fn is_write_conflict(err: &MetricsError) -> bool {
    match err {
        MetricsError::Storage(sqlx::Error::Database(db)) => {
            matches!(db.code().as_deref(), Some("5") | Some("6") | Some("517"))
                || db.message().contains("database is locked")
                || db.message().contains("database table is locked")
        }
        MetricsError::Storage(sqlx::Error::PoolTimedOut) => true,
        _ => false,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::DeveloperActivity;
    use crate::score::{ScoreEngine, ScoringConfig};
    use serde_json::json;

    async fn make_storage() -> Storage {
        Storage::in_memory().await.expect("in-memory storage")
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().expect("valid test date")
    }

    fn payload(commits: i64) -> SprintPayload {
        let engine = ScoreEngine::new(ScoringConfig::default());
        let developers = vec![engine.score_developer(DeveloperActivity {
            login: "ana".to_string(),
            commits,
            prs_opened: 2,
            prs_merged: 1,
            reviews_given: 4,
            lines_added: 500,
            lines_deleted: 100,
            avg_review_time_hours: Some(5.0),
            avg_cycle_time_hours: Some(30.0),
        })];
        SprintPayload {
            summary: Some(engine.summarize(&developers)),
            team_dimension_scores: Some(engine.team_dimension_scores(&developers)),
            developers,
            daily_activity: vec![],
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get_round_trip() {
        let storage = make_storage().await;
        let stored = storage
            .upsert_sprint(date("2026-01-07"), date("2026-01-20"), &payload(10))
            .await
            .expect("upsert");
        assert_eq!(stored.sprint_key, "sprint_2026-01-07_2026-01-20");

        let fetched = storage
            .get_sprint(date("2026-01-07"), date("2026-01-20"))
            .await
            .expect("get")
            .expect("record exists");
        assert_eq!(fetched, stored);
        let devs = &fetched.payload.expect("payload").developers;
        assert_eq!(devs[0].activity.commits, 10);
        assert_eq!(devs[0].dimension_scores.len(), 5);
    }

    #[tokio::test]
    async fn test_get_absent_window_is_none() {
        let storage = make_storage().await;
        let fetched = storage
            .get_sprint(date("2026-02-04"), date("2026-02-17"))
            .await
            .expect("get");
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn test_upsert_preserves_created_at() {
        let storage = make_storage().await;
        let first = storage
            .upsert_sprint(date("2026-01-07"), date("2026-01-20"), &payload(10))
            .await
            .expect("first upsert");
        let second = storage
            .upsert_sprint(date("2026-01-07"), date("2026-01-20"), &payload(99))
            .await
            .expect("second upsert");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(
            second.payload.expect("payload").developers[0].activity.commits,
            99
        );
    }

    #[tokio::test]
    async fn test_start_after_end_rejected() {
        let storage = make_storage().await;
        let err = storage
            .upsert_sprint(date("2026-01-20"), date("2026-01-07"), &payload(1))
            .await
            .unwrap_err();
        assert!(matches!(err, MetricsError::Validation(_)), "got: {err}");
    }

    #[tokio::test]
    async fn test_rejected_payload_preserves_prior_record() {
        let storage = make_storage().await;
        let original = storage
            .upsert_sprint(date("2026-01-07"), date("2026-01-20"), &payload(10))
            .await
            .expect("seed record");

        // developers must be an array; this write must change nothing.
        let err = storage
            .upsert_sprint_json(
                date("2026-01-07"),
                date("2026-01-20"),
                &json!({ "developers": {"ana": {"commits": 1}} }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MetricsError::Validation(_)), "got: {err}");

        let after = storage
            .get_sprint(date("2026-01-07"), date("2026-01-20"))
            .await
            .expect("get")
            .expect("record still there");
        assert_eq!(after, original);
    }

    #[tokio::test]
    async fn test_delete_sprint() {
        let storage = make_storage().await;
        storage
            .upsert_sprint(date("2026-01-07"), date("2026-01-20"), &payload(10))
            .await
            .expect("upsert");
        assert!(storage
            .delete_sprint(date("2026-01-07"), date("2026-01-20"))
            .await
            .expect("delete"));
        assert!(!storage
            .delete_sprint(date("2026-01-07"), date("2026-01-20"))
            .await
            .expect("second delete"));
        assert!(storage
            .get_sprint(date("2026-01-07"), date("2026-01-20"))
            .await
            .expect("get")
            .is_none());
    }

    #[tokio::test]
    async fn test_list_sprints_newest_first() {
        let storage = make_storage().await;
        storage
            .upsert_sprint(date("2026-01-07"), date("2026-01-20"), &payload(1))
            .await
            .expect("older");
        storage
            .upsert_sprint(date("2026-01-21"), date("2026-02-03"), &payload(2))
            .await
            .expect("newer");
        let all = storage.list_sprints().await.expect("list");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].start_date, date("2026-01-21"));
        assert_eq!(all[1].start_date, date("2026-01-07"));
    }

    #[tokio::test]
    async fn test_stats_counts_entries_and_bytes() {
        let storage = make_storage().await;
        let empty = storage.stats().await.expect("stats");
        assert_eq!(empty.entry_count, 0);
        assert_eq!(empty.total_bytes, 0);
        assert!(empty.oldest_updated_at.is_none());

        storage
            .upsert_sprint(date("2026-01-07"), date("2026-01-20"), &payload(1))
            .await
            .expect("upsert");
        storage
            .upsert_sprint(date("2026-01-21"), date("2026-02-03"), &payload(2))
            .await
            .expect("upsert");
        let stats = storage.stats().await.expect("stats");
        assert_eq!(stats.entry_count, 2);
        assert!(stats.total_bytes > 0);
        assert!(stats.newest_updated_at.is_some());
    }
}
