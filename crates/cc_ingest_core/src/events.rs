use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::contract::FieldError;

pub const EVENT_RECORD_SCHEMA_VERSION: &str = "v1";
pub const DEFAULT_EVENT_RETENTION_DAYS: i64 = 90;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataEventType {
    LicenseIngest,
    LicenseValidationError,
}

impl DataEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LicenseIngest => "license.ingest",
            Self::LicenseValidationError => "license.validation-error",
        }
    }
}

/// One immutable data event. Expired automatically via the table's
/// time-to-live attribute after the configured retention window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataEventRecord {
    pub compact: String,
    pub jurisdiction: String,
    pub event_type: String,
    pub event_id: String,
    pub event_time: String,
    pub ttl_epoch_seconds: i64,
    pub record_schema: String,
    pub detail: Value,
}

/// Deterministic event identity: the same upload row always maps to the
/// same id. Together with a clock taken from the notification rather than
/// the wall, retries of one S3 notification rewrite identical items
/// instead of duplicating them.
pub fn event_id(compact: &str, jurisdiction: &str, source_key: &str, row_number: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(compact.as_bytes());
    hasher.update(b"#");
    hasher.update(jurisdiction.as_bytes());
    hasher.update(b"#");
    hasher.update(source_key.as_bytes());
    hasher.update(b"#");
    hasher.update(row_number.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn event_expiry(event_epoch_seconds: i64, retention_days: i64) -> i64 {
    event_epoch_seconds + retention_days * SECONDS_PER_DAY
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventClock {
    /// RFC 3339 event time, carried verbatim into the sort key.
    pub event_time: String,
    pub epoch_seconds: i64,
}

pub fn ingest_event(
    compact: &str,
    jurisdiction: &str,
    source_key: &str,
    row_number: u64,
    clock: &EventClock,
    retention_days: i64,
) -> DataEventRecord {
    build_event(
        DataEventType::LicenseIngest,
        compact,
        jurisdiction,
        source_key,
        row_number,
        clock,
        retention_days,
        json!({
            "sourceKey": source_key,
            "rowNumber": row_number,
        }),
    )
}

/// Validation-error details name the failing fields and reasons only; the
/// row's values never reach the event table.
pub fn validation_error_event(
    compact: &str,
    jurisdiction: &str,
    source_key: &str,
    row_number: u64,
    errors: &[FieldError],
    clock: &EventClock,
    retention_days: i64,
) -> DataEventRecord {
    build_event(
        DataEventType::LicenseValidationError,
        compact,
        jurisdiction,
        source_key,
        row_number,
        clock,
        retention_days,
        json!({
            "sourceKey": source_key,
            "rowNumber": row_number,
            "errors": errors,
        }),
    )
}

#[allow(clippy::too_many_arguments)]
fn build_event(
    event_type: DataEventType,
    compact: &str,
    jurisdiction: &str,
    source_key: &str,
    row_number: u64,
    clock: &EventClock,
    retention_days: i64,
    detail: Value,
) -> DataEventRecord {
    DataEventRecord {
        compact: compact.to_string(),
        jurisdiction: jurisdiction.to_string(),
        event_type: event_type.as_str().to_string(),
        event_id: event_id(compact, jurisdiction, source_key, row_number),
        event_time: clock.event_time.clone(),
        ttl_epoch_seconds: event_expiry(clock.epoch_seconds, retention_days),
        record_schema: EVENT_RECORD_SCHEMA_VERSION.to_string(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_clock() -> EventClock {
        EventClock {
            event_time: "2026-08-28T12:00:00+00:00".to_string(),
            epoch_seconds: 1_787_829_600,
        }
    }

    #[test]
    fn event_id_is_deterministic_for_identical_input() {
        let first = event_id("aslp", "oh", "aslp/oh/2026-08-28.csv", 7);
        let second = event_id("aslp", "oh", "aslp/oh/2026-08-28.csv", 7);
        assert_eq!(first, second);
    }

    #[test]
    fn event_id_differs_across_rows() {
        let first = event_id("aslp", "oh", "aslp/oh/2026-08-28.csv", 7);
        let second = event_id("aslp", "oh", "aslp/oh/2026-08-28.csv", 8);
        assert_ne!(first, second);
    }

    #[test]
    fn expiry_adds_the_retention_window() {
        assert_eq!(event_expiry(1_000, 90), 1_000 + 90 * 86_400);
    }

    #[test]
    fn validation_error_detail_carries_field_names_not_values() {
        let errors = vec![FieldError::new("ssn", "must be formatted ddd-dd-dddd")];
        let record = validation_error_event(
            "aslp",
            "oh",
            "aslp/oh/2026-08-28.csv",
            3,
            &errors,
            &test_clock(),
            DEFAULT_EVENT_RETENTION_DAYS,
        );

        assert_eq!(record.event_type, "license.validation-error");
        assert_eq!(record.detail["rowNumber"], 3);
        assert_eq!(record.detail["errors"][0]["field"], "ssn");
        assert!(record.detail["errors"][0]
            .as_object()
            .expect("error entry should be an object")
            .keys()
            .all(|key| key == "field" || key == "message"));
    }

    #[test]
    fn ingest_event_reuses_identity_across_retries() {
        let clock = test_clock();
        let first = ingest_event("aslp", "oh", "aslp/oh/u.csv", 1, &clock, 90);
        let second = ingest_event("aslp", "oh", "aslp/oh/u.csv", 1, &clock, 90);
        assert_eq!(first, second);
    }
}
