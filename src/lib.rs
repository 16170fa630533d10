// lib.rs — sprintd library crate.
//
// Scores raw team activity into normalized per-developer and team metrics
// and caches the results per sprint window in SQLite. The binary in
// main.rs wires these modules together and runs the refresh loop.

pub mod config;
pub mod error;
pub mod fetch;
pub mod jobs;
pub mod projection;
pub mod retry;
pub mod score;
pub mod sprints;
pub mod storage;

pub use error::MetricsError;
pub use fetch::{ActivityFetcher, FetchError, RawSprintPayload};
pub use projection::{project, LoginFilter, SprintView};
pub use score::{Dimension, DimensionSpec, ScoreEngine, ScoringConfig, Trend};
pub use sprints::{SprintCache, SprintCalendar, SprintRecord};
pub use storage::Storage;
