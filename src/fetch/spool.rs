// fetch/spool.rs — Directory-backed activity source.
//
// A collector drops one JSON snapshot per sprint window into the spool
// directory, named `{start}_{end}.json` with ISO dates. A snapshot that is
// not there yet is a transient condition; one that exists but cannot be
// read or parsed is fatal until someone replaces it.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use super::{ActivityFetcher, FetchError, RawSprintPayload};

pub struct SpoolFetcher {
    dir: PathBuf,
}

impl SpoolFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn snapshot_path(&self, start_date: NaiveDate, end_date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{start_date}_{end_date}.json"))
    }
}

#[async_trait]
impl ActivityFetcher for SpoolFetcher {
    async fn fetch(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<RawSprintPayload, FetchError> {
        let path = self.snapshot_path(start_date, end_date);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::Transient(format!(
                    "no activity snapshot at {}",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(FetchError::Fatal(format!(
                    "reading snapshot {}: {e}",
                    path.display()
                )));
            }
        };
        let payload: RawSprintPayload = serde_json::from_slice(&bytes).map_err(|e| {
            FetchError::Fatal(format!("parsing snapshot {}: {e}", path.display()))
        })?;
        debug!(
            path = %path.display(),
            developers = payload.developers.len(),
            "activity snapshot loaded"
        );
        Ok(payload)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
