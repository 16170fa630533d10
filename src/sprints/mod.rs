// sprints/mod.rs — Cache-aside access to scored sprint records.
//
// Reads serve the stored record when one exists. A miss, or an explicit
// force, fetches raw activity, scores every developer, derives the team
// aggregates, and replaces the stored payload wholesale. Fetch errors pass
// through to the caller untouched so the refresh scheduler can tell
// transient trouble from fatal trouble.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

use crate::error::MetricsError;
use crate::fetch::{ActivityFetcher, RawSprintPayload};
use crate::score::{DeveloperMetric, ScoreEngine};
use crate::storage::Storage;

pub mod calendar;
pub mod record;

pub use calendar::{SprintCalendar, SprintWindow};
pub use record::{SprintPayload, SprintRecord};

pub struct SprintCache {
    storage: Arc<Storage>,
    fetcher: Arc<dyn ActivityFetcher>,
    engine: ScoreEngine,
    calendar: SprintCalendar,
}

/// One sprint of a developer's history, with the team mean alongside for
/// contrast. `metric` is None for sprints the developer sat out.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPoint {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_current: bool,
    pub metric: Option<DeveloperMetric>,
    pub team_avg_composite: f64,
}

impl SprintCache {
    pub fn new(
        storage: Arc<Storage>,
        fetcher: Arc<dyn ActivityFetcher>,
        engine: ScoreEngine,
        calendar: SprintCalendar,
    ) -> Self {
        Self { storage, fetcher, engine, calendar }
    }

    pub fn engine(&self) -> &ScoreEngine {
        &self.engine
    }

    pub fn calendar(&self) -> &SprintCalendar {
        &self.calendar
    }

    /// The record for a window, loading and scoring it on a miss.
    ///
    /// With `force` false, a cached record is returned unchanged and the
    /// fetcher is never consulted. With `force` true the cache is bypassed
    /// and the stored payload replaced with a freshly scored one.
    pub async fn get_or_load(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        force: bool,
    ) -> Result<SprintRecord, MetricsError> {
        if start_date > end_date {
            return Err(MetricsError::Validation(format!(
                "sprint start {start_date} is after end {end_date}"
            )));
        }
        if !force {
            if let Some(cached) = self.storage.get_sprint(start_date, end_date).await? {
                debug!(key = %cached.sprint_key, "sprint cache hit");
                return Ok(cached);
            }
        }
        let raw = self.fetcher.fetch(start_date, end_date).await?;
        let payload = self.score_payload(raw);
        let record = self.storage.upsert_sprint(start_date, end_date, &payload).await?;
        info!(
            key = %record.sprint_key,
            developers = payload.developers.len(),
            forced = force,
            "sprint loaded and scored"
        );
        Ok(record)
    }

    /// The stored record for an exact window, or NotFound. Never fetches.
    pub async fn cached(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<SprintRecord, MetricsError> {
        self.storage
            .get_sprint(start_date, end_date)
            .await?
            .ok_or_else(|| {
                MetricsError::NotFound(format!(
                    "no cached sprint for {start_date}..{end_date}"
                ))
            })
    }

    /// Recompute every developer's scores and the cached aggregates from
    /// the raw counters already in `record`, then persist. Raw counters are
    /// left untouched. Returns the record unchanged when it has no payload.
    ///
    /// This is the path to run after a scoring calibration change: no
    /// re-fetch, same activity, new scores.
    pub async fn recalculate(&self, record: &SprintRecord) -> Result<SprintRecord, MetricsError> {
        let Some(payload) = &record.payload else {
            debug!(key = %record.sprint_key, "recalculate skipped, record has no payload");
            return Ok(record.clone());
        };
        let raw = RawSprintPayload {
            developers: payload.developers.iter().map(|d| d.activity.clone()).collect(),
            daily_activity: payload.daily_activity.clone(),
        };
        let rescored = self.score_payload(raw);
        self.storage
            .upsert_sprint(record.start_date, record.end_date, &rescored)
            .await
    }

    /// A developer's metrics across the `count` most recent sprints, oldest
    /// first, with the team average composite per sprint for comparison.
    ///
    /// Sprints load cache-aside, never forced. Records written before
    /// per-dimension scoring existed are scored in memory on the way out;
    /// the stored payload is not rewritten. Errors if the developer shows
    /// up in none of the windows.
    pub async fn developer_history(
        &self,
        login: &str,
        count: usize,
    ) -> Result<Vec<HistoryPoint>, MetricsError> {
        let today = Utc::now().date_naive();
        let windows = self.calendar.recent(today, count)?;
        let mut points = Vec::with_capacity(windows.len());
        let mut seen = false;
        for window in windows {
            let record = self
                .get_or_load(window.start_date, window.end_date, false)
                .await?;
            let point = match record.payload {
                Some(payload) => {
                    let developers = self.ensure_scores(payload.developers);
                    let metric = developers
                        .iter()
                        .find(|d| d.activity.login == login)
                        .cloned();
                    let team_avg_composite = match payload.summary {
                        Some(summary) => summary.avg_composite_score,
                        None => self.engine.team_composite(&developers),
                    };
                    HistoryPoint {
                        start_date: window.start_date,
                        end_date: window.end_date,
                        is_current: window.is_current,
                        metric,
                        team_avg_composite,
                    }
                }
                None => HistoryPoint {
                    start_date: window.start_date,
                    end_date: window.end_date,
                    is_current: window.is_current,
                    metric: None,
                    team_avg_composite: 0.0,
                },
            };
            seen = seen || point.metric.is_some();
            points.push(point);
        }
        if !seen {
            return Err(MetricsError::NotFound(format!(
                "developer '{login}' has no activity in the last {count} sprints"
            )));
        }
        Ok(points)
    }

    /// Score raw activity into a full payload: per-developer rows first,
    /// then the team aggregates derived from them.
    fn score_payload(&self, raw: RawSprintPayload) -> SprintPayload {
        let developers: Vec<DeveloperMetric> = raw
            .developers
            .into_iter()
            .map(|activity| self.engine.score_developer(activity))
            .collect();
        let summary = self.engine.summarize(&developers);
        let team_dimension_scores = self.engine.team_dimension_scores(&developers);
        SprintPayload {
            developers,
            daily_activity: raw.daily_activity,
            summary: Some(summary),
            team_dimension_scores: Some(team_dimension_scores),
        }
    }

    /// Backfill dimension scores for rows stored before scoring existed.
    fn ensure_scores(&self, developers: Vec<DeveloperMetric>) -> Vec<DeveloperMetric> {
        developers
            .into_iter()
            .map(|dev| {
                if dev.dimension_scores.is_empty() {
                    self.engine.score_developer(dev.activity)
                } else {
                    dev
                }
            })
            .collect()
    }
}
