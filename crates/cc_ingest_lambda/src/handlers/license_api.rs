use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::adapters::event_store::EventStore;
use crate::adapters::license_store::LicenseStore;
use crate::runtime::contract::{validate_row, FieldError, LicenseRecord, SchemaConfig};
use crate::runtime::error::CcError;
use crate::runtime::events::{ingest_event, EventClock};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseApiConfig {
    pub schema: SchemaConfig,
    pub clock: EventClock,
    pub retention_days: i64,
}

/// Synchronous license submission for one compact jurisdiction. The whole
/// batch validates before anything persists, so a 400 response means
/// nothing was stored and the client can fix and resubmit.
pub fn handle_post_licenses(
    event: Value,
    config: &LicenseApiConfig,
    licenses: &impl LicenseStore,
    events: &impl EventStore,
) -> ApiGatewayResponse {
    let (compact, jurisdiction) = match path_scope(&event) {
        Ok(value) => value,
        Err(message) => return validation_error_response(&message),
    };

    if !config.schema.allows_compact(&compact) {
        return cc_error_response(&CcError::NotFound(format!(
            "compact '{compact}' is not configured"
        )));
    }
    if !config.schema.allows_jurisdiction(&jurisdiction) {
        return cc_error_response(&CcError::NotFound(format!(
            "jurisdiction '{jurisdiction}' is not configured"
        )));
    }

    let submissions = match normalize_body(&event) {
        Ok(value) => value,
        Err(message) => return validation_error_response(&message),
    };

    let mut records: Vec<LicenseRecord> = Vec::with_capacity(submissions.len());
    let mut failures: BTreeMap<String, Vec<FieldError>> = BTreeMap::new();
    for (index, submission) in submissions.iter().enumerate() {
        match validate_submission(submission, &compact, &jurisdiction, &config.schema) {
            Ok(record) => records.push(record),
            Err(errors) => {
                failures.insert(index.to_string(), errors);
            }
        }
    }

    if !failures.is_empty() {
        return error_response(
            400,
            json!({
                "error": "validation_error",
                "message": "one or more license records failed validation",
                "errors": failures,
            }),
        );
    }

    let source = request_source(&event);
    for (index, record) in records.iter().enumerate() {
        if let Err(error) = licenses.put_license(record) {
            return persistence_failure_response(
                index,
                &format!("failed to persist license record: {error}"),
            );
        }
        let row_number = (index + 1) as u64;
        let event_record = ingest_event(
            &compact,
            &jurisdiction,
            &source,
            row_number,
            &config.clock,
            config.retention_days,
        );
        if let Err(error) = events.put_event(&event_record) {
            return persistence_failure_response(
                index + 1,
                &format!("failed to record ingest event: {error}"),
            );
        }
    }

    log_info(
        "licenses_posted",
        json!({
            "compact": compact.clone(),
            "jurisdiction": jurisdiction.clone(),
            "persisted": records.len(),
        }),
    );

    success_response(
        200,
        json!({
            "message": "OK",
            "persisted": records.len(),
        }),
    )
}

fn validate_submission(
    submission: &Value,
    compact: &str,
    jurisdiction: &str,
    schema: &SchemaConfig,
) -> Result<LicenseRecord, Vec<FieldError>> {
    let Some(object) = submission.as_object() else {
        return Err(vec![FieldError::new("record", "must be a JSON object")]);
    };

    let mut values: BTreeMap<String, Value> = object
        .iter()
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();
    // The path names the scope; records may repeat it but not contradict it.
    values
        .entry("compact".to_string())
        .or_insert_with(|| Value::String(compact.to_string()));
    values
        .entry("jurisdiction".to_string())
        .or_insert_with(|| Value::String(jurisdiction.to_string()));

    let record = validate_row(&values, schema)?;

    let mut mismatches = Vec::new();
    if record.compact != compact {
        mismatches.push(FieldError::new("compact", "does not match the request path"));
    }
    if record.jurisdiction != jurisdiction {
        mismatches.push(FieldError::new(
            "jurisdiction",
            "does not match the request path",
        ));
    }
    if mismatches.is_empty() {
        Ok(record)
    } else {
        Err(mismatches)
    }
}

fn path_scope(event: &Value) -> Result<(String, String), String> {
    let parameters = event
        .get("pathParameters")
        .and_then(Value::as_object)
        .ok_or_else(|| "request must carry compact and jurisdiction path parameters".to_string())?;
    let compact = path_parameter(parameters, "compact")?;
    let jurisdiction = path_parameter(parameters, "jurisdiction")?;
    Ok((compact, jurisdiction))
}

fn path_parameter(parameters: &Map<String, Value>, name: &str) -> Result<String, String> {
    parameters
        .get(name)
        .and_then(Value::as_str)
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| format!("missing path parameter: {name}"))
}

fn normalize_body(event: &Value) -> Result<Vec<Value>, String> {
    let body = event
        .get("body")
        .ok_or_else(|| "request body must be a JSON array of license records".to_string())?;

    let parsed = match body {
        Value::String(text) => {
            serde_json::from_str(text).map_err(|error| format!("malformed JSON body: {error}"))?
        }
        other => other.clone(),
    };

    match parsed {
        Value::Array(items) if !items.is_empty() => Ok(items),
        Value::Array(_) => Err("request body must not be empty".to_string()),
        _ => Err("request body must be a JSON array of license records".to_string()),
    }
}

fn request_source(event: &Value) -> String {
    let request_id = event["requestContext"]["requestId"]
        .as_str()
        .unwrap_or("local");
    format!("api#{request_id}")
}

fn validation_error_response(message: &str) -> ApiGatewayResponse {
    error_response(
        400,
        json!({
            "error": "validation_error",
            "message": message,
        }),
    )
}

fn cc_error_response(error: &CcError) -> ApiGatewayResponse {
    error_response(
        error.status_code(),
        json!({
            "error": error.error_code(),
            "message": error.message(),
        }),
    )
}

/// A 500 mid-batch leaves earlier records stored. The body says how many,
/// and that resubmitting is safe: license writes are keyed by provider, so
/// a retry rewrites the stored items rather than duplicating them.
fn persistence_failure_response(persisted: usize, message: &str) -> ApiGatewayResponse {
    let error = CcError::Internal(message.to_string());
    error_response(
        error.status_code(),
        json!({
            "error": error.error_code(),
            "message": error.message(),
            "persisted": persisted,
            "retry": "license records persisted so far remain stored; resubmitting the full batch is safe",
        }),
    )
}

fn success_response(status_code: u16, payload: impl Serialize) -> ApiGatewayResponse {
    ApiGatewayResponse {
        status_code,
        headers: json!({"Content-Type": "application/json"}),
        body: serde_json::to_string(&payload).expect("response payload should serialize"),
    }
}

fn error_response(status_code: u16, payload: Value) -> ApiGatewayResponse {
    ApiGatewayResponse {
        status_code,
        headers: json!({"Content-Type": "application/json"}),
        body: payload.to_string(),
    }
}

fn log_info(event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "license_api_handler",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}
