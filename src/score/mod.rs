// score/mod.rs — Normalized dimension scoring over raw activity counters.
//
// Every dimension is calibrated by a (perfect, zero, weight) triple with an
// explicit improvement direction. A raw value at or past `perfect` scores
// 100, at or past `zero` scores 0, linear in between. The composite is the
// weighted sum of dimension scores. Missing raw input scores 0 for that
// dimension and never poisons the rest of the developer's row.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MetricsError;
use crate::fetch::DeveloperActivity;

pub mod aggregate;

pub use aggregate::SprintSummary;

/// Weights may drift from 1.0 by at most this much before the config is
/// rejected.
const WEIGHT_TOLERANCE: f64 = 1e-6;

// ─── Dimensions ─────────────────────────────────────────────────────────────

/// The five scored dimensions.
///
/// Serialized names are the canonical snake_case forms. Older payloads used
/// `review_speed` and `pr_cycle_time`; those are accepted on the way in and
/// never written on the way out.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    #[serde(alias = "review_speed")]
    ReviewTurnaround,
    #[serde(alias = "pr_cycle_time")]
    CycleTime,
    PrSize,
    ReviewCoverage,
    CommitFrequency,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::ReviewTurnaround,
        Dimension::CycleTime,
        Dimension::PrSize,
        Dimension::ReviewCoverage,
        Dimension::CommitFrequency,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::ReviewTurnaround => "review_turnaround",
            Dimension::CycleTime => "cycle_time",
            Dimension::PrSize => "pr_size",
            Dimension::ReviewCoverage => "review_coverage",
            Dimension::CommitFrequency => "commit_frequency",
        }
    }
}

/// Which direction of the raw value counts as improvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// Smaller raw values score higher (latencies, PR size).
    LowerIsBetter,
    /// Larger raw values score higher (counts).
    HigherIsBetter,
}

/// Calibration for one dimension.
///
/// `perfect` is the raw value that earns 100, `zero` the raw value that
/// earns 0. For [`Trend::LowerIsBetter`] dimensions `perfect < zero`; for
/// [`Trend::HigherIsBetter`] the opposite. The linear interpolation between
/// the two thresholds works unchanged in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub perfect: f64,
    pub zero: f64,
    pub weight: f64,
    pub trend: Trend,
}

// ─── ScoringConfig ──────────────────────────────────────────────────────────

/// Validated calibration for all five dimensions.
///
/// Construction is the only place invariants are checked; once a config
/// exists, every dimension has a spec and the weights sum to 1.0.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    specs: BTreeMap<Dimension, DimensionSpec>,
}

impl ScoringConfig {
    /// Validate and freeze a calibration table.
    ///
    /// Rejects a missing dimension, a negative or non-finite weight, equal
    /// thresholds, thresholds that contradict the declared trend, and
    /// weights that do not sum to 1.0.
    pub fn new(specs: BTreeMap<Dimension, DimensionSpec>) -> Result<Self, MetricsError> {
        for dimension in Dimension::ALL {
            let Some(spec) = specs.get(&dimension) else {
                return Err(MetricsError::Validation(format!(
                    "scoring config is missing dimension '{}'",
                    dimension.as_str()
                )));
            };
            if !spec.weight.is_finite() || spec.weight < 0.0 {
                return Err(MetricsError::Validation(format!(
                    "dimension '{}' has invalid weight {}",
                    dimension.as_str(),
                    spec.weight
                )));
            }
            if spec.perfect == spec.zero {
                return Err(MetricsError::Validation(format!(
                    "dimension '{}' has equal perfect and zero thresholds",
                    dimension.as_str()
                )));
            }
            let consistent = match spec.trend {
                Trend::LowerIsBetter => spec.perfect < spec.zero,
                Trend::HigherIsBetter => spec.perfect > spec.zero,
            };
            if !consistent {
                return Err(MetricsError::Validation(format!(
                    "dimension '{}' thresholds contradict its trend",
                    dimension.as_str()
                )));
            }
        }
        let total: f64 = specs.values().map(|s| s.weight).sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(MetricsError::Validation(format!(
                "dimension weights must sum to 1.0, got {total}"
            )));
        }
        Ok(Self { specs })
    }

    /// Calibration for one dimension. Every dimension is present, the
    /// constructor guarantees it.
    pub fn spec(&self, dimension: Dimension) -> &DimensionSpec {
        &self.specs[&dimension]
    }

    pub fn specs(&self) -> &BTreeMap<Dimension, DimensionSpec> {
        &self.specs
    }
}

impl Default for ScoringConfig {
    /// Reference calibration: review turnaround 2h..24h (25%), cycle time
    /// 8h..72h (25%), PR size 200..1000 lines (20%), review coverage 0..10
    /// reviews (15%), commit frequency 0..20 commits (15%).
    fn default() -> Self {
        let mut specs = BTreeMap::new();
        specs.insert(
            Dimension::ReviewTurnaround,
            DimensionSpec { perfect: 2.0, zero: 24.0, weight: 0.25, trend: Trend::LowerIsBetter },
        );
        specs.insert(
            Dimension::CycleTime,
            DimensionSpec { perfect: 8.0, zero: 72.0, weight: 0.25, trend: Trend::LowerIsBetter },
        );
        specs.insert(
            Dimension::PrSize,
            DimensionSpec { perfect: 200.0, zero: 1000.0, weight: 0.20, trend: Trend::LowerIsBetter },
        );
        specs.insert(
            Dimension::ReviewCoverage,
            DimensionSpec { perfect: 10.0, zero: 0.0, weight: 0.15, trend: Trend::HigherIsBetter },
        );
        specs.insert(
            Dimension::CommitFrequency,
            DimensionSpec { perfect: 20.0, zero: 0.0, weight: 0.15, trend: Trend::HigherIsBetter },
        );
        Self { specs }
    }
}

// ─── Scored developer rows ──────────────────────────────────────────────────

/// A developer's raw counters plus everything derived from them.
///
/// Serializes flat: the raw counters sit next to `dimension_scores` and
/// `composite_score` in one JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeveloperMetric {
    #[serde(flatten)]
    pub activity: DeveloperActivity,
    /// 0..=100 per dimension, one decimal place.
    #[serde(default)]
    pub dimension_scores: BTreeMap<Dimension, f64>,
    /// Weighted sum of dimension scores, 0..=100, one decimal place.
    #[serde(default)]
    pub composite_score: f64,
}

// ─── ScoreEngine ────────────────────────────────────────────────────────────

/// Turns raw activity into normalized scores. Pure computation, no I/O,
/// never fails: absent input scores 0.
#[derive(Debug, Clone)]
pub struct ScoreEngine {
    config: ScoringConfig,
}

impl ScoreEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score one raw value against its calibration. `None` scores 0.
    pub fn dimension_score(&self, dimension: Dimension, raw: Option<f64>) -> f64 {
        let Some(raw) = raw else {
            return 0.0;
        };
        let spec = self.config.spec(dimension);
        let fraction = (raw - spec.zero) / (spec.perfect - spec.zero);
        round1((fraction * 100.0).clamp(0.0, 100.0))
    }

    /// All five dimension scores for one developer's counters.
    pub fn dimension_scores(&self, activity: &DeveloperActivity) -> BTreeMap<Dimension, f64> {
        self.config
            .specs
            .keys()
            .map(|&dimension| {
                (
                    dimension,
                    self.dimension_score(dimension, raw_value(dimension, activity)),
                )
            })
            .collect()
    }

    /// Weighted sum of dimension scores, clamped to 0..=100. A dimension
    /// absent from `scores` contributes 0.
    pub fn composite(&self, scores: &BTreeMap<Dimension, f64>) -> f64 {
        let total: f64 = self
            .config
            .specs
            .iter()
            .map(|(dimension, spec)| scores.get(dimension).copied().unwrap_or(0.0) * spec.weight)
            .sum();
        round1(total.clamp(0.0, 100.0))
    }

    /// Full scored row for one developer.
    pub fn score_developer(&self, activity: DeveloperActivity) -> DeveloperMetric {
        let dimension_scores = self.dimension_scores(&activity);
        let composite_score = self.composite(&dimension_scores);
        DeveloperMetric { activity, dimension_scores, composite_score }
    }
}

/// The raw value feeding one dimension, or None when the window holds no
/// qualifying activity for it. A developer with no opened PRs has no PR
/// size, the same way they have no review latency.
fn raw_value(dimension: Dimension, activity: &DeveloperActivity) -> Option<f64> {
    match dimension {
        Dimension::ReviewTurnaround => activity.avg_review_time_hours,
        Dimension::CycleTime => activity.avg_cycle_time_hours,
        Dimension::PrSize => (activity.prs_opened > 0).then(|| {
            (activity.lines_added + activity.lines_deleted) as f64 / activity.prs_opened as f64
        }),
        Dimension::ReviewCoverage => Some(activity.reviews_given as f64),
        Dimension::CommitFrequency => Some(activity.commits as f64),
    }
}

/// Round to one decimal place, the precision every stored score carries.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ─── Tests ──────────────────────────────────────────────────────────────────
