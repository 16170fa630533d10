// config/mod.rs — Engine configuration.
//
// Assembled once at startup from three layers and then passed around
// immutably. Priority (highest to lowest):
//   1. CLI flags / environment  - passed in as Some(value) from clap
//   2. TOML file                - {data_dir}/config.toml
//   3. Built-in defaults

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::MetricsError;
use crate::score::{Dimension, DimensionSpec, ScoringConfig};

const DEFAULT_LOG: &str = "info";
const DEFAULT_LOG_FORMAT: &str = "pretty";

// ─── ScoringSection ─────────────────────────────────────────────────────────

/// Dimension calibration (`[scoring]` in config.toml).
///
/// Each dimension is a `{ perfect, zero, weight, trend }` table, e.g.
/// `review_turnaround = { perfect = 2.0, zero = 24.0, weight = 0.25,
/// trend = "lower_is_better" }`. Omitted dimensions keep the reference
/// calibration; the five weights must still sum to 1.0.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringSection {
    pub review_turnaround: DimensionSpec,
    pub cycle_time: DimensionSpec,
    pub pr_size: DimensionSpec,
    pub review_coverage: DimensionSpec,
    pub commit_frequency: DimensionSpec,
}

impl Default for ScoringSection {
    fn default() -> Self {
        let reference = ScoringConfig::default();
        Self {
            review_turnaround: *reference.spec(Dimension::ReviewTurnaround),
            cycle_time: *reference.spec(Dimension::CycleTime),
            pr_size: *reference.spec(Dimension::PrSize),
            review_coverage: *reference.spec(Dimension::ReviewCoverage),
            commit_frequency: *reference.spec(Dimension::CommitFrequency),
        }
    }
}

impl ScoringSection {
    /// Build the validated engine calibration from this section.
    pub fn to_scoring_config(&self) -> Result<ScoringConfig, MetricsError> {
        let mut specs = BTreeMap::new();
        specs.insert(Dimension::ReviewTurnaround, self.review_turnaround);
        specs.insert(Dimension::CycleTime, self.cycle_time);
        specs.insert(Dimension::PrSize, self.pr_size);
        specs.insert(Dimension::ReviewCoverage, self.review_coverage);
        specs.insert(Dimension::CommitFrequency, self.commit_frequency);
        ScoringConfig::new(specs)
    }
}

// ─── CalendarSection ────────────────────────────────────────────────────────

/// Sprint boundaries (`[calendar]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CalendarSection {
    /// First day of sprint zero, as a quoted ISO date ("2026-01-07").
    pub anchor: NaiveDate,
    /// Days per sprint window. Default: 14.
    pub duration_days: u32,
}

impl Default for CalendarSection {
    fn default() -> Self {
        Self {
            anchor: NaiveDate::from_ymd_opt(2026, 1, 7).unwrap_or_default(),
            duration_days: 14,
        }
    }
}

// ─── RefreshSection ─────────────────────────────────────────────────────────

/// Background refresh cadence (`[refresh]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshSection {
    /// Seconds between refresh cycles. Default: 3600.
    pub interval_secs: u64,
    /// How many recent sprints each cycle refreshes (current plus the
    /// windows before it). 0 makes every cycle a vacuous ok that refreshes
    /// nothing; the refresh loop warns about it at startup. Default: 2.
    pub window_count: usize,
}

impl Default for RefreshSection {
    fn default() -> Self {
        Self { interval_secs: 3600, window_count: 2 }
    }
}

// ─── ObservabilitySection ───────────────────────────────────────────────────

/// Observability knobs (`[observability]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilitySection {
    /// Log SQLite statements slower than this many milliseconds at WARN.
    /// 0 disables slow-statement logging. Default: 100.
    pub slow_query_threshold_ms: u64,
}

impl Default for ObservabilitySection {
    fn default() -> Self {
        Self { slow_query_threshold_ms: 100 }
    }
}

// ─── TomlConfig ─────────────────────────────────────────────────────────────

/// Shape of `{data_dir}/config.toml`. Every field is an optional override.
#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    /// Log level filter, e.g. "debug" or "info,sprintd=trace".
    log: Option<String>,
    /// "pretty" or "json".
    log_format: Option<String>,
    /// Directory activity snapshots land in.
    spool_dir: Option<PathBuf>,
    scoring: Option<ScoringSection>,
    calendar: Option<CalendarSection>,
    refresh: Option<RefreshSection>,
    observability: Option<ObservabilitySection>,
}

/// Read `{data_dir}/config.toml` if present. A malformed file reports on
/// stderr (config resolution runs before the tracing subscriber exists)
/// and falls back to defaults rather than refusing to start.
fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let raw = std::fs::read_to_string(&path).ok()?;
    match toml::from_str(&raw) {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!(
                "warn: failed to parse {}: {e}, using defaults",
                path.display()
            );
            None
        }
    }
}

// ─── EngineConfig ───────────────────────────────────────────────────────────

/// Fully resolved engine configuration, immutable after startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub spool_dir: PathBuf,
    pub log: String,
    pub log_format: String,
    pub scoring: ScoringSection,
    pub calendar: CalendarSection,
    pub refresh: RefreshSection,
    pub observability: ObservabilitySection,
}

impl EngineConfig {
    /// Resolve the configuration. CLI / env values arrive as `Some`; the
    /// TOML file and built-in defaults fill the rest.
    pub fn new(data_dir: Option<PathBuf>, spool_dir: Option<PathBuf>, log: Option<String>) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let toml = load_toml(&data_dir).unwrap_or_default();
        let log = log.or(toml.log).unwrap_or_else(|| DEFAULT_LOG.to_string());
        let log_format = std::env::var("SPRINTD_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| DEFAULT_LOG_FORMAT.to_string());
        let spool_dir = spool_dir
            .or(toml.spool_dir)
            .unwrap_or_else(|| data_dir.join("spool"));
        Self {
            spool_dir,
            log,
            log_format,
            scoring: toml.scoring.unwrap_or_default(),
            calendar: toml.calendar.unwrap_or_default(),
            refresh: toml.refresh.unwrap_or_default(),
            observability: toml.observability.unwrap_or_default(),
            data_dir,
        }
    }
}

/// Platform data directory: `~/Library/Application Support/sprintd` on
/// macOS, `$XDG_DATA_HOME/sprintd` or `~/.local/share/sprintd` on Linux,
/// `%APPDATA%\sprintd` on Windows, `.sprintd` as a last resort.
fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("sprintd");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
            if !xdg.is_empty() {
                return PathBuf::from(xdg).join("sprintd");
            }
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".local").join("share").join("sprintd");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("sprintd");
        }
    }
    PathBuf::from(".sprintd")
}

// ─── Tests ──────────────────────────────────────────────────────────────────
