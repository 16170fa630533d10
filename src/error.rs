// error.rs — Error taxonomy for sprint metrics operations.
//
// Callers branch on these variants: Validation and NotFound map to caller
// mistakes, TransientFetch is retryable on the next cycle, FatalFetch is
// not, and Storage/Serialize wrap the infrastructure below us.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    /// The input violates a structural rule. Nothing was persisted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The activity source could not deliver right now. The next refresh
    /// cycle is expected to succeed without intervention.
    #[error("transient fetch failure: {0}")]
    TransientFetch(String),

    /// The activity source failed in a way another attempt will not fix.
    #[error("fatal fetch failure: {0}")]
    FatalFetch(String),

    /// The requested record or developer does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
