// fetch/mod.rs — Activity source boundary.
//
// Upstream collectors deliver raw per-developer counters and team-level
// daily aggregates for one date range. Everything past the ActivityFetcher
// trait (HTTP, pagination, rate limits) lives outside this crate; what
// comes back through it is plain data, never scores.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::MetricsError;

pub mod spool;

pub use spool::SpoolFetcher;

/// Raw activity for one sprint window, as delivered by a collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSprintPayload {
    #[serde(default)]
    pub developers: Vec<DeveloperActivity>,
    #[serde(default)]
    pub daily_activity: Vec<DailyActivity>,
}

/// One contributor's raw counters for one sprint window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeveloperActivity {
    pub login: String,
    #[serde(default)]
    pub commits: i64,
    #[serde(default)]
    pub prs_opened: i64,
    #[serde(default)]
    pub prs_merged: i64,
    #[serde(default)]
    pub reviews_given: i64,
    #[serde(default)]
    pub lines_added: i64,
    #[serde(default)]
    pub lines_deleted: i64,
    /// Mean hours from review request to first review. None when none of
    /// the developer's PRs received a review in the window.
    #[serde(default)]
    pub avg_review_time_hours: Option<f64>,
    /// Mean hours from PR open to merge. None when nothing merged.
    #[serde(default)]
    pub avg_cycle_time_hours: Option<f64>,
}

/// Whole-team counters for a single day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyActivity {
    pub date: NaiveDate,
    #[serde(default)]
    pub commits: i64,
    #[serde(default)]
    pub prs_opened: i64,
    #[serde(default)]
    pub prs_merged: i64,
    #[serde(default)]
    pub reviews: i64,
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Connectivity trouble, rate limiting, or data not collected yet.
    /// Worth another attempt on the next cycle.
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// Broken credentials, malformed data, anything the next cycle will
    /// not fix by itself.
    #[error("fatal fetch failure: {0}")]
    Fatal(String),
}

impl From<FetchError> for MetricsError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Transient(msg) => MetricsError::TransientFetch(msg),
            FetchError::Fatal(msg) => MetricsError::FatalFetch(msg),
        }
    }
}

/// Source of raw sprint activity for a date range, inclusive on both ends.
#[async_trait]
pub trait ActivityFetcher: Send + Sync {
    async fn fetch(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<RawSprintPayload, FetchError>;
}
