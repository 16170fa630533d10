// SPDX-License-Identifier: MIT
//! Read-side shaping of a cached sprint record.
//!
//! [`project`] turns a record into what one consumer is allowed to see,
//! optionally restricted to a set of developer logins. An unfiltered
//! projection returns the cached aggregates verbatim without touching the
//! developer rows; a filtered one recomputes summary and team scores over
//! the visible subset only and reports how much of the roster it kept.
//! Projection itself never fails, whatever shape the record is in.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::MetricsError;
use crate::fetch::DailyActivity;
use crate::score::{DeveloperMetric, Dimension, ScoreEngine, SprintSummary};
use crate::sprints::record::SprintRecord;

/// How much of the roster a filtered projection kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterMeta {
    pub total_developers: usize,
    pub visible_developers: usize,
}

/// A sprint as served to one consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SprintView {
    pub developers: Vec<DeveloperMetric>,
    /// Team-wide daily series; served whole even under a login filter.
    pub daily: Vec<DailyActivity>,
    pub summary: SprintSummary,
    pub team_dimension_scores: BTreeMap<Dimension, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_meta: Option<FilterMeta>,
}

/// Intersection of independent login restrictions.
///
/// Each [`LoginFilter::restrict`] call ANDs one more allowed set in, so
/// stacked restrictions (a team roster, then a requested subset) can only
/// narrow visibility. With no restrictions the filter builds to `None`,
/// which [`project`] reads as "everyone".
#[derive(Debug, Clone, Default)]
pub struct LoginFilter {
    sets: Vec<BTreeSet<String>>,
}

impl LoginFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restrict<I, S>(mut self, logins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sets.push(logins.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Option<BTreeSet<String>> {
        let mut sets = self.sets.into_iter();
        let first = sets.next()?;
        Some(sets.fold(first, |acc, set| acc.intersection(&set).cloned().collect()))
    }
}

/// Shape `record` for a consumer.
///
/// A record with no payload projects to an empty view rather than an error.
pub fn project(
    engine: &ScoreEngine,
    record: &SprintRecord,
    allowed: Option<&BTreeSet<String>>,
) -> SprintView {
    let Some(payload) = &record.payload else {
        return SprintView {
            developers: Vec::new(),
            daily: Vec::new(),
            summary: SprintSummary::default(),
            team_dimension_scores: engine.team_dimension_scores(&[]),
            filter_meta: allowed.map(|_| FilterMeta {
                total_developers: 0,
                visible_developers: 0,
            }),
        };
    };

    match allowed {
        None => SprintView {
            developers: payload.developers.clone(),
            daily: payload.daily_activity.clone(),
            summary: payload
                .summary
                .unwrap_or_else(|| engine.summarize(&payload.developers)),
            team_dimension_scores: payload
                .team_dimension_scores
                .clone()
                .unwrap_or_else(|| engine.team_dimension_scores(&payload.developers)),
            filter_meta: None,
        },
        Some(allowed) => {
            let developers: Vec<DeveloperMetric> = payload
                .developers
                .iter()
                .filter(|d| allowed.contains(&d.activity.login))
                .cloned()
                .collect();
            let summary = engine.summarize(&developers);
            let team_dimension_scores = engine.team_dimension_scores(&developers);
            let filter_meta = Some(FilterMeta {
                total_developers: payload.developers.len(),
                visible_developers: developers.len(),
            });
            SprintView {
                developers,
                daily: payload.daily_activity.clone(),
                summary,
                team_dimension_scores,
                filter_meta,
            }
        }
    }
}

/// The named developer's row inside `record`.
pub fn find_developer<'a>(
    record: &'a SprintRecord,
    login: &str,
) -> Result<&'a DeveloperMetric, MetricsError> {
    record
        .payload
        .as_ref()
        .and_then(|p| p.developers.iter().find(|d| d.activity.login == login))
        .ok_or_else(|| {
            MetricsError::NotFound(format!(
                "developer '{login}' not in sprint {}",
                record.sprint_key
            ))
        })
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::DeveloperActivity;
    use crate::score::ScoringConfig;
    use crate::sprints::record::{sprint_key, SprintPayload};
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        s.parse().expect("valid test date")
    }

    fn engine() -> ScoreEngine {
        ScoreEngine::new(ScoringConfig::default())
    }

    fn activity(login: &str, commits: i64) -> DeveloperActivity {
        DeveloperActivity {
            login: login.to_string(),
            commits,
            prs_opened: 3,
            prs_merged: 2,
            reviews_given: 6,
            lines_added: 600,
            lines_deleted: 150,
            avg_review_time_hours: Some(4.0),
            avg_cycle_time_hours: Some(18.0),
        }
    }

    fn record_for(engine: &ScoreEngine, activities: Vec<DeveloperActivity>) -> SprintRecord {
        let developers: Vec<DeveloperMetric> = activities
            .into_iter()
            .map(|a| engine.score_developer(a))
            .collect();
        let payload = SprintPayload {
            summary: Some(engine.summarize(&developers)),
            team_dimension_scores: Some(engine.team_dimension_scores(&developers)),
            developers,
            daily_activity: vec![DailyActivity {
                date: date("2026-01-08"),
                commits: 5,
                prs_opened: 1,
                prs_merged: 1,
                reviews: 2,
            }],
        };
        SprintRecord {
            sprint_key: sprint_key(date("2026-01-07"), date("2026-01-20")),
            start_date: date("2026-01-07"),
            end_date: date("2026-01-20"),
            payload: Some(payload),
            created_at: 100,
            updated_at: 100,
        }
    }

    fn logins(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unfiltered_serves_cached_aggregates_verbatim() {
        let engine = engine();
        let mut record = record_for(&engine, vec![activity("ana", 10), activity("bo", 4)]);
        // Poison the cached summary; an unfiltered read must serve it as-is,
        // proving it does not recompute.
        if let Some(payload) = record.payload.as_mut() {
            if let Some(summary) = payload.summary.as_mut() {
                summary.total_commits = 999;
            }
        }
        let view = project(&engine, &record, None);
        assert_eq!(view.summary.total_commits, 999);
        assert_eq!(view.developers.len(), 2);
        assert_eq!(view.daily.len(), 1);
        assert!(view.filter_meta.is_none());
    }

    #[test]
    fn test_filter_with_all_logins_matches_unfiltered() {
        let engine = engine();
        let record = record_for(&engine, vec![activity("ana", 10), activity("bo", 4)]);
        let unfiltered = project(&engine, &record, None);
        let everyone = logins(&["ana", "bo"]);
        let filtered = project(&engine, &record, Some(&everyone));

        assert_eq!(filtered.developers, unfiltered.developers);
        assert_eq!(filtered.summary, unfiltered.summary);
        assert_eq!(filtered.team_dimension_scores, unfiltered.team_dimension_scores);
        assert_eq!(
            filtered.filter_meta,
            Some(FilterMeta { total_developers: 2, visible_developers: 2 })
        );
    }

    #[test]
    fn test_filter_recomputes_over_subset() {
        let engine = engine();
        let record = record_for(&engine, vec![activity("ana", 10), activity("bo", 4)]);
        let only_ana = logins(&["ana"]);
        let view = project(&engine, &record, Some(&only_ana));

        assert_eq!(view.developers.len(), 1);
        assert_eq!(view.developers[0].activity.login, "ana");
        assert_eq!(view.summary.total_commits, 10);
        assert_eq!(
            view.summary.avg_composite_score,
            view.developers[0].composite_score
        );
        assert_eq!(
            view.filter_meta,
            Some(FilterMeta { total_developers: 2, visible_developers: 1 })
        );
        // The daily series stays team-wide.
        assert_eq!(view.daily.len(), 1);
    }

    #[test]
    fn test_filter_matching_nobody_yields_zeros() {
        let engine = engine();
        let record = record_for(&engine, vec![activity("ana", 10)]);
        let nobody = logins(&[]);
        let view = project(&engine, &record, Some(&nobody));
        assert!(view.developers.is_empty());
        assert_eq!(view.summary, SprintSummary::default());
        assert!(view.team_dimension_scores.values().all(|&v| v == 0.0));
        assert_eq!(
            view.filter_meta,
            Some(FilterMeta { total_developers: 1, visible_developers: 0 })
        );
    }

    #[test]
    fn test_record_without_payload_projects_empty() {
        let engine = engine();
        let record = SprintRecord {
            sprint_key: sprint_key(date("2026-01-07"), date("2026-01-20")),
            start_date: date("2026-01-07"),
            end_date: date("2026-01-20"),
            payload: None,
            created_at: 1,
            updated_at: 1,
        };
        let view = project(&engine, &record, None);
        assert!(view.developers.is_empty());
        assert!(view.daily.is_empty());
        assert_eq!(view.summary, SprintSummary::default());
        assert!(view.filter_meta.is_none());

        let everyone = logins(&["ana"]);
        let view = project(&engine, &record, Some(&everyone));
        assert_eq!(
            view.filter_meta,
            Some(FilterMeta { total_developers: 0, visible_developers: 0 })
        );
    }

    #[test]
    fn test_login_filter_builds_intersection() {
        assert_eq!(LoginFilter::new().build(), None);

        let single = LoginFilter::new().restrict(["ana", "bo"]).build();
        assert_eq!(single, Some(logins(&["ana", "bo"])));

        let narrowed = LoginFilter::new()
            .restrict(["ana", "bo", "cem"])
            .restrict(["bo", "cem", "dee"])
            .build();
        assert_eq!(narrowed, Some(logins(&["bo", "cem"])));

        let empty = LoginFilter::new()
            .restrict(["ana"])
            .restrict(["bo"])
            .build();
        assert_eq!(empty, Some(BTreeSet::new()));
    }

    #[test]
    fn test_find_developer() {
        let engine = engine();
        let record = record_for(&engine, vec![activity("ana", 10)]);
        let found = find_developer(&record, "ana").expect("ana exists");
        assert_eq!(found.activity.commits, 10);
        let err = find_developer(&record, "ghost").unwrap_err();
        assert!(matches!(err, MetricsError::NotFound(_)), "got: {err}");
    }
}
