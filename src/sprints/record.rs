// sprints/record.rs — Cached sprint records and their integrity rules.
//
// A record is identified by its date range and replaced wholesale on every
// write. The payload is structurally validated before any persist; a
// rejected write must leave whatever was stored before fully intact.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::MetricsError;
use crate::fetch::DailyActivity;
use crate::score::{DeveloperMetric, Dimension, SprintSummary};

/// Storage key for a sprint window.
pub fn sprint_key(start_date: NaiveDate, end_date: NaiveDate) -> String {
    format!("sprint_{start_date}_{end_date}")
}

/// Everything cached for one sprint window.
///
/// `developers` and `daily_activity` are fetched and scored; `summary` and
/// `team_dimension_scores` are derived from `developers` at write time so
/// unfiltered reads never recompute them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SprintPayload {
    #[serde(default)]
    pub developers: Vec<DeveloperMetric>,
    #[serde(default)]
    pub daily_activity: Vec<DailyActivity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SprintSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_dimension_scores: Option<BTreeMap<Dimension, f64>>,
}

/// One cached sprint. `start_date <= end_date` always holds; single-day
/// sprints (equal dates) are allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct SprintRecord {
    pub sprint_key: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub payload: Option<SprintPayload>,
    /// Unix seconds, set on first insert and preserved across upserts.
    pub created_at: i64,
    /// Unix seconds, replaced on every upsert.
    pub updated_at: i64,
}

impl SprintRecord {
    /// Cache-validation token for conditional reads.
    ///
    /// Derived from the record key, the payload content hash, and
    /// `updated_at`. It changes whenever the payload content changes, even
    /// deep inside a developer row, and whenever the record is rewritten
    /// with identical content.
    pub fn cache_token(&self) -> Result<String, MetricsError> {
        let value = serde_json::to_value(&self.payload)?;
        let hash = content_hash(&value);
        Ok(hex_sha256(&format!(
            "{}:{}:{}",
            self.sprint_key, hash, self.updated_at
        )))
    }
}

/// Hex SHA-256 over the canonical serialization of a payload.
///
/// serde_json objects are BTreeMap-backed, so keys serialize sorted and two
/// payloads differing only in key order hash identically. Array element
/// order is preserved and significant.
pub fn content_hash(payload: &Value) -> String {
    hex_sha256(&payload.to_string())
}

fn hex_sha256(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Structural check run before any persist.
///
/// The payload must be a JSON object. `developers` and `daily_activity`
/// must be arrays when present; `summary` and `team_dimension_scores` must
/// be objects when present. Absence of any of them is fine.
pub fn validate_payload(payload: &Value) -> Result<(), MetricsError> {
    let Some(map) = payload.as_object() else {
        return Err(MetricsError::Validation(
            "sprint payload must be a JSON object".to_string(),
        ));
    };
    for key in ["developers", "daily_activity"] {
        if let Some(value) = map.get(key) {
            if !value.is_array() {
                return Err(MetricsError::Validation(format!(
                    "sprint payload field '{key}' must be an array"
                )));
            }
        }
    }
    for key in ["summary", "team_dimension_scores"] {
        if let Some(value) = map.get(key) {
            if !value.is_object() {
                return Err(MetricsError::Validation(format!(
                    "sprint payload field '{key}' must be an object"
                )));
            }
        }
    }
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        s.parse().expect("valid test date")
    }

    fn record(payload: Value, updated_at: i64) -> SprintRecord {
        let payload: SprintPayload = serde_json::from_value(payload).expect("payload parses");
        SprintRecord {
            sprint_key: sprint_key(date("2026-01-07"), date("2026-01-20")),
            start_date: date("2026-01-07"),
            end_date: date("2026-01-20"),
            payload: Some(payload),
            created_at: 1_767_744_000,
            updated_at,
        }
    }

    #[test]
    fn test_sprint_key_format() {
        assert_eq!(
            sprint_key(date("2026-01-07"), date("2026-01-20")),
            "sprint_2026-01-07_2026-01-20"
        );
    }

    #[test]
    fn test_validate_accepts_full_and_partial_payloads() {
        validate_payload(&json!({
            "developers": [],
            "daily_activity": [],
            "summary": {},
            "team_dimension_scores": {}
        }))
        .expect("full payload valid");
        validate_payload(&json!({ "developers": [] })).expect("partial payload valid");
        validate_payload(&json!({})).expect("empty object valid");
    }

    #[test]
    fn test_validate_rejects_wrong_shapes() {
        let err = validate_payload(&json!({ "developers": {"ana": 1} })).unwrap_err();
        assert!(err.to_string().contains("developers"), "got: {err}");

        let err = validate_payload(&json!({ "daily_activity": "busy" })).unwrap_err();
        assert!(err.to_string().contains("daily_activity"), "got: {err}");

        let err = validate_payload(&json!({ "summary": [1, 2] })).unwrap_err();
        assert!(err.to_string().contains("summary"), "got: {err}");

        let err = validate_payload(&json!({ "team_dimension_scores": 7 })).unwrap_err();
        assert!(err.to_string().contains("team_dimension_scores"), "got: {err}");

        assert!(validate_payload(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_content_hash_ignores_key_order() {
        let a: Value =
            serde_json::from_str(r#"{"summary": {"total_commits": 3, "total_prs": 1}}"#).unwrap();
        let b: Value =
            serde_json::from_str(r#"{"summary": {"total_prs": 1, "total_commits": 3}}"#).unwrap();
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_content_hash_respects_array_order() {
        let a = json!({ "developers": [{"login": "ana"}, {"login": "bo"}] });
        let b = json!({ "developers": [{"login": "bo"}, {"login": "ana"}] });
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_token_changes_with_nested_content() {
        let base = json!({
            "developers": [{"login": "ana", "commits": 10}],
            "daily_activity": []
        });
        let changed = json!({
            "developers": [{"login": "ana", "commits": 11}],
            "daily_activity": []
        });
        // Same updated_at: only the nested counter differs.
        let token_a = record(base, 100).cache_token().unwrap();
        let token_b = record(changed, 100).cache_token().unwrap();
        assert_ne!(token_a, token_b);
    }

    #[test]
    fn test_token_changes_with_updated_at() {
        let payload = json!({ "developers": [{"login": "ana", "commits": 10}] });
        let token_a = record(payload.clone(), 100).cache_token().unwrap();
        let token_b = record(payload, 101).cache_token().unwrap();
        assert_ne!(token_a, token_b);
    }

    #[test]
    fn test_token_stable_for_identical_records() {
        let payload = json!({ "developers": [{"login": "ana", "commits": 10}] });
        let token_a = record(payload.clone(), 100).cache_token().unwrap();
        let token_b = record(payload, 100).cache_token().unwrap();
        assert_eq!(token_a, token_b);
    }
}
