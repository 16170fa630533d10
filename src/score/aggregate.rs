// score/aggregate.rs — Team-level aggregation over a set of scored rows.
//
// The same functions serve the full sprint roster and any filtered subset;
// nothing here assumes it sees every developer. An empty set aggregates to
// zeros, never to an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::score::{round1, DeveloperMetric, Dimension, ScoreEngine};

/// Headline totals for one sprint (or one filtered slice of it).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SprintSummary {
    #[serde(default)]
    pub total_commits: i64,
    #[serde(default)]
    pub total_prs: i64,
    #[serde(default)]
    pub total_merged: i64,
    #[serde(default)]
    pub total_reviews: i64,
    /// Mean composite across the set, one decimal place.
    #[serde(default, alias = "avg_dxi_score")]
    pub avg_composite_score: f64,
}

impl ScoreEngine {
    /// Arithmetic mean of each dimension score across `developers`, one
    /// decimal place. All dimensions at 0.0 for an empty set.
    pub fn team_dimension_scores(
        &self,
        developers: &[DeveloperMetric],
    ) -> BTreeMap<Dimension, f64> {
        self.config()
            .specs()
            .keys()
            .map(|&dimension| {
                let mean = if developers.is_empty() {
                    0.0
                } else {
                    developers
                        .iter()
                        .map(|d| d.dimension_scores.get(&dimension).copied().unwrap_or(0.0))
                        .sum::<f64>()
                        / developers.len() as f64
                };
                (dimension, round1(mean))
            })
            .collect()
    }

    /// Mean composite score across `developers`, 0.0 for an empty set.
    pub fn team_composite(&self, developers: &[DeveloperMetric]) -> f64 {
        if developers.is_empty() {
            return 0.0;
        }
        round1(
            developers.iter().map(|d| d.composite_score).sum::<f64>() / developers.len() as f64,
        )
    }

    /// Totals plus the mean composite for `developers`.
    pub fn summarize(&self, developers: &[DeveloperMetric]) -> SprintSummary {
        SprintSummary {
            total_commits: developers.iter().map(|d| d.activity.commits).sum(),
            total_prs: developers.iter().map(|d| d.activity.prs_opened).sum(),
            total_merged: developers.iter().map(|d| d.activity.prs_merged).sum(),
            total_reviews: developers.iter().map(|d| d.activity.reviews_given).sum(),
            avg_composite_score: self.team_composite(developers),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
