use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::adapters::event_store::EventStore;
use crate::adapters::license_store::LicenseStore;
use crate::adapters::upload_source::UploadSource;
use crate::runtime::contract::{FieldError, SchemaConfig, LICENSE_RECORD_SCHEMA_VERSION};
use crate::runtime::csv_ingest::{validated_rows, CsvRowStream};
use crate::runtime::events::{ingest_event, validation_error_event, EventClock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkUploadConfig {
    pub schema: SchemaConfig,
    pub clock: EventClock,
    pub retention_days: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadObjectRef {
    pub bucket: String,
    pub key: String,
    /// Clock taken from the notification's `eventTime`, when present, so a
    /// redelivered notification rebuilds event records with identical keys.
    pub clock: Option<EventClock>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestSummary {
    pub compact: String,
    pub jurisdiction: String,
    pub source_key: String,
    pub rows_processed: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub record_schema: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestError {
    pub message: String,
}

impl IngestError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Processes every object in an S3 notification to completion. Row-level
/// failures are reported as validation-error events and never abort the
/// file; storage failures do abort, leaving the retry to the platform.
pub fn handle_bulk_upload(
    event: Value,
    config: &BulkUploadConfig,
    source: &impl UploadSource,
    licenses: &impl LicenseStore,
    events: &impl EventStore,
) -> Result<Vec<IngestSummary>, IngestError> {
    let objects = parse_s3_notification(&event)?;
    let mut summaries = Vec::with_capacity(objects.len());
    for object in objects {
        summaries.push(ingest_object(&object, config, source, licenses, events)?);
    }
    Ok(summaries)
}

fn ingest_object(
    object: &UploadObjectRef,
    config: &BulkUploadConfig,
    source: &impl UploadSource,
    licenses: &impl LicenseStore,
    events: &impl EventStore,
) -> Result<IngestSummary, IngestError> {
    let (compact, jurisdiction) = split_upload_key(&object.key)?;
    let clock = object.clock.as_ref().unwrap_or(&config.clock);
    if !config.schema.allows_compact(&compact) {
        return Err(IngestError::new(format!(
            "upload path names compact '{compact}', which is not configured"
        )));
    }
    if !config.schema.allows_jurisdiction(&jurisdiction) {
        return Err(IngestError::new(format!(
            "upload path names jurisdiction '{jurisdiction}', which is not configured"
        )));
    }

    log_info(
        "ingest_started",
        json!({
            "bucket": object.bucket.clone(),
            "key": object.key.clone(),
            "compact": compact.clone(),
            "jurisdiction": jurisdiction.clone(),
        }),
    );

    let body = source
        .read_object(&object.bucket, &object.key)
        .map_err(|error| IngestError::new(format!("failed to read upload object: {error}")))?;

    let stream = CsvRowStream::new(body.as_slice())
        .map_err(|error| IngestError::new(format!("unreadable upload: {error}")))?;

    let mut rows_processed = 0usize;
    let mut valid_rows = 0usize;
    let mut invalid_rows = 0usize;

    for outcome in validated_rows(stream, &config.schema) {
        rows_processed += 1;
        let row_errors = match outcome.result {
            Ok(record) => {
                let mut mismatches = Vec::new();
                if record.compact != compact {
                    mismatches.push(FieldError::new(
                        "compact",
                        "does not match the upload location",
                    ));
                }
                if record.jurisdiction != jurisdiction {
                    mismatches.push(FieldError::new(
                        "jurisdiction",
                        "does not match the upload location",
                    ));
                }
                if mismatches.is_empty() {
                    licenses.put_license(&record).map_err(|error| {
                        IngestError::new(format!("failed to persist license record: {error}"))
                    })?;
                    events
                        .put_event(&ingest_event(
                            &compact,
                            &jurisdiction,
                            &object.key,
                            outcome.row_number,
                            clock,
                            config.retention_days,
                        ))
                        .map_err(|error| {
                            IngestError::new(format!("failed to record ingest event: {error}"))
                        })?;
                    valid_rows += 1;
                    None
                } else {
                    Some(mismatches)
                }
            }
            Err(failure) => Some(failure.field_errors()),
        };

        if let Some(errors) = row_errors {
            invalid_rows += 1;
            events
                .put_event(&validation_error_event(
                    &compact,
                    &jurisdiction,
                    &object.key,
                    outcome.row_number,
                    &errors,
                    clock,
                    config.retention_days,
                ))
                .map_err(|error| {
                    IngestError::new(format!("failed to record validation-error event: {error}"))
                })?;
        }
    }

    let summary = IngestSummary {
        compact,
        jurisdiction,
        source_key: object.key.clone(),
        rows_processed,
        valid_rows,
        invalid_rows,
        record_schema: LICENSE_RECORD_SCHEMA_VERSION.to_string(),
    };

    log_info(
        "ingest_completed",
        json!({
            "key": summary.source_key.clone(),
            "rows_processed": summary.rows_processed,
            "valid_rows": summary.valid_rows,
            "invalid_rows": summary.invalid_rows,
        }),
    );

    Ok(summary)
}

pub fn parse_s3_notification(event: &Value) -> Result<Vec<UploadObjectRef>, IngestError> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| IngestError::new("notification payload has no Records array"))?;

    let mut objects = Vec::with_capacity(records.len());
    for record in records {
        let bucket = record["s3"]["bucket"]["name"]
            .as_str()
            .ok_or_else(|| IngestError::new("notification record has no bucket name"))?;
        let key = record["s3"]["object"]["key"]
            .as_str()
            .ok_or_else(|| IngestError::new("notification record has no object key"))?;
        objects.push(UploadObjectRef {
            bucket: bucket.to_string(),
            key: decode_object_key(key),
            clock: record["eventTime"].as_str().and_then(notification_clock),
        });
    }
    Ok(objects)
}

/// Derives the event clock from a notification timestamp. The rendered
/// time is normalized through chrono so the same `eventTime` always yields
/// the same sort-key text.
fn notification_clock(event_time: &str) -> Option<EventClock> {
    let parsed = DateTime::parse_from_rfc3339(event_time).ok()?;
    Some(EventClock {
        event_time: parsed.to_rfc3339(),
        epoch_seconds: parsed.timestamp(),
    })
}

/// S3 notifications URL-encode object keys, with `+` standing for a space.
pub fn decode_object_key(key: &str) -> String {
    let mut decoded = String::with_capacity(key.len());
    let mut bytes = Vec::new();
    let mut chars = key.chars();
    while let Some(c) = chars.next() {
        match c {
            '+' => flush_decoded(&mut bytes, &mut decoded, ' '),
            '%' => {
                let high = chars.next();
                let low = chars.next();
                match (high.and_then(|c| c.to_digit(16)), low.and_then(|c| c.to_digit(16))) {
                    (Some(high), Some(low)) => bytes.push((high * 16 + low) as u8),
                    _ => {
                        // Not a valid escape; keep the text as written.
                        flush_decoded(&mut bytes, &mut decoded, '%');
                        if let Some(c) = high {
                            decoded.push(c);
                        }
                        if let Some(c) = low {
                            decoded.push(c);
                        }
                    }
                }
            }
            other => flush_decoded(&mut bytes, &mut decoded, other),
        }
    }
    if !bytes.is_empty() {
        decoded.push_str(&String::from_utf8_lossy(&bytes));
    }
    decoded
}

fn flush_decoded(bytes: &mut Vec<u8>, decoded: &mut String, next: char) {
    if !bytes.is_empty() {
        decoded.push_str(&String::from_utf8_lossy(bytes));
        bytes.clear();
    }
    decoded.push(next);
}

fn split_upload_key(key: &str) -> Result<(String, String), IngestError> {
    let mut segments = key.split('/');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(compact), Some(jurisdiction), Some(filename))
            if !compact.is_empty() && !jurisdiction.is_empty() && !filename.is_empty() =>
        {
            Ok((compact.to_lowercase(), jurisdiction.to_lowercase()))
        }
        _ => Err(IngestError::new(format!(
            "object key '{key}' is not shaped compact/jurisdiction/filename"
        ))),
    }
}

fn log_info(event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "bulk_upload_handler",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::runtime::contract::LicenseRecord;
    use crate::runtime::events::DataEventRecord;

    const HEADER: &str = "compact,jurisdiction,licenseType,status,givenName,middleName,familyName,ssn,npi,dateOfIssuance,dateOfRenewal,dateOfExpiration,dateOfBirth,homeAddressStreet1,homeAddressStreet2,homeAddressCity,homeAddressState,homeAddressPostalCode,emailAddress,phoneNumber,militaryWaiver";

    const VALID_ROW: &str = "aslp,oh,audiologist,active,Joe,,Dokes,123-45-6789,,2010-06-06,2024-06-06,2025-06-06,1985-06-06,1640 Riverside Drive,,Hill Valley,oh,43004,,,";

    struct StaticSource {
        objects: HashMap<String, Vec<u8>>,
    }

    impl StaticSource {
        fn with_object(key: &str, body: Vec<u8>) -> Self {
            Self {
                objects: HashMap::from([(key.to_string(), body)]),
            }
        }
    }

    impl UploadSource for StaticSource {
        fn read_object(&self, _bucket: &str, key: &str) -> Result<Vec<u8>, String> {
            self.objects
                .get(key)
                .cloned()
                .ok_or_else(|| format!("no such object: {key}"))
        }
    }

    struct RecordingLicenseStore {
        records: Mutex<Vec<LicenseRecord>>,
    }

    impl RecordingLicenseStore {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
            }
        }

        fn records(&self) -> Vec<LicenseRecord> {
            self.records.lock().expect("poisoned mutex").clone()
        }
    }

    impl LicenseStore for RecordingLicenseStore {
        fn put_license(&self, record: &LicenseRecord) -> Result<(), String> {
            self.records
                .lock()
                .expect("poisoned mutex")
                .push(record.clone());
            Ok(())
        }
    }

    struct FailingLicenseStore;

    impl LicenseStore for FailingLicenseStore {
        fn put_license(&self, _record: &LicenseRecord) -> Result<(), String> {
            Err("simulated table outage".to_string())
        }
    }

    struct RecordingEventStore {
        events: Mutex<HashMap<String, DataEventRecord>>,
    }

    impl RecordingEventStore {
        fn new() -> Self {
            Self {
                events: Mutex::new(HashMap::new()),
            }
        }

        fn events(&self) -> Vec<DataEventRecord> {
            self.events
                .lock()
                .expect("poisoned mutex")
                .values()
                .cloned()
                .collect()
        }

        fn event_count(&self) -> usize {
            self.events.lock().expect("poisoned mutex").len()
        }
    }

    impl EventStore for RecordingEventStore {
        fn put_event(&self, record: &DataEventRecord) -> Result<(), String> {
            // Keyed by event id, as the table's composite key would be.
            self.events
                .lock()
                .expect("poisoned mutex")
                .insert(record.event_id.clone(), record.clone());
            Ok(())
        }
    }

    fn test_config() -> BulkUploadConfig {
        BulkUploadConfig {
            schema: SchemaConfig::new(["aslp"], ["oh", "ky"]),
            clock: EventClock {
                event_time: "2026-08-28T12:05:00+00:00".to_string(),
                epoch_seconds: 1_787_918_700,
            },
            retention_days: 90,
        }
    }

    fn notification(key: &str) -> Value {
        json!({
            "Records": [
                {
                    "eventTime": "2026-08-28T12:00:00+00:00",
                    "s3": {"bucket": {"name": "license-uploads"}, "object": {"key": key}}
                }
            ]
        })
    }

    fn upload(rows: &[&str]) -> Vec<u8> {
        let mut body = String::from(HEADER);
        for row in rows {
            body.push('\n');
            body.push_str(row);
        }
        body.into_bytes()
    }

    #[test]
    fn persists_valid_rows_and_records_ingest_events() {
        let key = "aslp/oh/2026-08-28.csv";
        let second_row = VALID_ROW.replace("123-45-6789", "987-65-4321");
        let source = StaticSource::with_object(key, upload(&[VALID_ROW, second_row.as_str()]));
        let licenses = RecordingLicenseStore::new();
        let events = RecordingEventStore::new();

        let summaries =
            handle_bulk_upload(notification(key), &test_config(), &source, &licenses, &events)
                .expect("ingest should succeed");

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].rows_processed, 2);
        assert_eq!(summaries[0].valid_rows, 2);
        assert_eq!(summaries[0].invalid_rows, 0);
        assert_eq!(licenses.records().len(), 2);
        assert!(events
            .events()
            .iter()
            .all(|event| event.event_type == "license.ingest"));
    }

    #[test]
    fn invalid_row_records_error_event_and_does_not_halt_the_file() {
        let key = "aslp/oh/2026-08-28.csv";
        let bad_row = VALID_ROW.replace("123-45-6789", "not-an-ssn");
        let source = StaticSource::with_object(key, upload(&[bad_row.as_str(), VALID_ROW]));
        let licenses = RecordingLicenseStore::new();
        let events = RecordingEventStore::new();

        let summaries =
            handle_bulk_upload(notification(key), &test_config(), &source, &licenses, &events)
                .expect("ingest should succeed");

        assert_eq!(summaries[0].valid_rows, 1);
        assert_eq!(summaries[0].invalid_rows, 1);
        assert_eq!(licenses.records().len(), 1);

        let error_event = events
            .events()
            .into_iter()
            .find(|event| event.event_type == "license.validation-error")
            .expect("error event should exist");
        assert_eq!(error_event.detail["rowNumber"], 1);
        assert_eq!(error_event.detail["errors"][0]["field"], "ssn");
    }

    #[test]
    fn row_for_another_jurisdiction_is_rejected_not_persisted() {
        let key = "aslp/oh/2026-08-28.csv";
        let foreign_row = VALID_ROW.replacen("aslp,oh", "aslp,ky", 1);
        let source = StaticSource::with_object(key, upload(&[foreign_row.as_str()]));
        let licenses = RecordingLicenseStore::new();
        let events = RecordingEventStore::new();

        let summaries =
            handle_bulk_upload(notification(key), &test_config(), &source, &licenses, &events)
                .expect("ingest should succeed");

        assert_eq!(summaries[0].invalid_rows, 1);
        assert!(licenses.records().is_empty());
        let error_event = &events.events()[0];
        assert_eq!(error_event.event_type, "license.validation-error");
        assert_eq!(error_event.detail["errors"][0]["field"], "jurisdiction");
    }

    #[test]
    fn reprocessing_the_same_notification_rewrites_identical_events() {
        let key = "aslp/oh/2026-08-28.csv";
        let source = StaticSource::with_object(key, upload(&[VALID_ROW]));
        let licenses = RecordingLicenseStore::new();
        let events = RecordingEventStore::new();

        // A redelivered notification lands in a later invocation, so the
        // wall clocks differ. The notification's own eventTime must win.
        let first_invocation = test_config();
        let mut second_invocation = test_config();
        second_invocation.clock = EventClock {
            event_time: "2026-08-28T12:06:00+00:00".to_string(),
            epoch_seconds: first_invocation.clock.epoch_seconds + 60,
        };

        handle_bulk_upload(
            notification(key),
            &first_invocation,
            &source,
            &licenses,
            &events,
        )
        .expect("first pass should succeed");
        let first_pass = events.events();

        handle_bulk_upload(
            notification(key),
            &second_invocation,
            &source,
            &licenses,
            &events,
        )
        .expect("second pass should succeed");

        assert_eq!(events.event_count(), first_pass.len());
        assert_eq!(events.events(), first_pass);
        assert_eq!(first_pass[0].event_time, "2026-08-28T12:00:00+00:00");
    }

    #[test]
    fn notification_without_event_time_uses_the_invocation_clock() {
        let key = "aslp/oh/2026-08-28.csv";
        let source = StaticSource::with_object(key, upload(&[VALID_ROW]));
        let licenses = RecordingLicenseStore::new();
        let events = RecordingEventStore::new();
        let config = test_config();

        let payload = json!({
            "Records": [
                {"s3": {"bucket": {"name": "license-uploads"}, "object": {"key": key}}}
            ]
        });

        handle_bulk_upload(payload, &config, &source, &licenses, &events)
            .expect("ingest should succeed");

        assert_eq!(events.events()[0].event_time, config.clock.event_time);
    }

    #[test]
    fn notification_event_time_is_normalized_into_the_clock() {
        let clock = notification_clock("2026-08-28T12:00:00Z").expect("valid timestamp");
        assert_eq!(clock.event_time, "2026-08-28T12:00:00+00:00");
        assert_eq!(clock.epoch_seconds, 1_787_918_400);
        assert!(notification_clock("last tuesday").is_none());
    }

    #[test]
    fn unconfigured_upload_path_fails_before_reading_the_object() {
        let key = "coun/oh/2026-08-28.csv";
        let source = StaticSource::with_object(key, upload(&[VALID_ROW]));
        let licenses = RecordingLicenseStore::new();
        let events = RecordingEventStore::new();

        let error =
            handle_bulk_upload(notification(key), &test_config(), &source, &licenses, &events)
                .expect_err("ingest should fail");

        assert!(error.message.contains("compact 'coun'"));
        assert!(licenses.records().is_empty());
        assert_eq!(events.event_count(), 0);
    }

    #[test]
    fn license_store_failure_aborts_the_file() {
        let key = "aslp/oh/2026-08-28.csv";
        let source = StaticSource::with_object(key, upload(&[VALID_ROW]));
        let events = RecordingEventStore::new();

        let error = handle_bulk_upload(
            notification(key),
            &test_config(),
            &source,
            &FailingLicenseStore,
            &events,
        )
        .expect_err("ingest should fail");

        assert!(error.message.contains("failed to persist license record"));
    }

    #[test]
    fn malformed_notification_is_rejected() {
        let source = StaticSource::with_object("aslp/oh/u.csv", upload(&[VALID_ROW]));
        let licenses = RecordingLicenseStore::new();
        let events = RecordingEventStore::new();

        let error = handle_bulk_upload(
            json!({"detail": "not an s3 notification"}),
            &test_config(),
            &source,
            &licenses,
            &events,
        )
        .expect_err("ingest should fail");

        assert!(error.message.contains("Records"));
    }

    #[test]
    fn decodes_url_encoded_object_keys() {
        assert_eq!(
            decode_object_key("aslp/oh/uploads%2F2026+Q3%20file.csv"),
            "aslp/oh/uploads/2026 Q3 file.csv"
        );
        assert_eq!(decode_object_key("plain/key/file.csv"), "plain/key/file.csv");
        assert_eq!(decode_object_key("odd%2"), "odd%2");
    }
}
