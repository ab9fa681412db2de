use std::collections::BTreeMap;
use std::io::Read;

use serde_json::Value;

use crate::contract::{validate_row, FieldError, LicenseRecord, SchemaConfig};

/// A parse failure scoped to one data row. Subsequent rows are unaffected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub row_number: u64,
    pub message: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}: {}", self.row_number, self.message)
    }
}

impl std::error::Error for RowError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedRow {
    /// 1-based position among the data rows (the header is row 0).
    pub row_number: u64,
    pub fields: BTreeMap<String, String>,
}

/// Lazy, single-pass reader over a bulk upload: header row plus data rows,
/// comma-delimited with double-quote escaping. Column counts are enforced
/// strictly; a row with more (or fewer) fields than the header yields a
/// [`RowError`] rather than being truncated or padded. Blank fields are
/// dropped from the mapping so optional values are absent, never `""`.
pub struct CsvRowStream<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    headers: csv::StringRecord,
    row_number: u64,
}

impl<R: Read> CsvRowStream<R> {
    pub fn new(reader: R) -> Result<Self, RowError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(false)
            .from_reader(reader);
        let headers = csv_reader
            .headers()
            .map_err(|error| RowError {
                row_number: 0,
                message: format!("failed to read header row: {error}"),
            })?
            .clone();
        Ok(Self {
            records: csv_reader.into_records(),
            headers,
            row_number: 0,
        })
    }

    pub fn headers(&self) -> &csv::StringRecord {
        &self.headers
    }
}

impl<R: Read> Iterator for CsvRowStream<R> {
    type Item = Result<NumberedRow, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        self.row_number += 1;
        match record {
            Ok(record) => {
                let mut fields = BTreeMap::new();
                for (header, value) in self.headers.iter().zip(record.iter()) {
                    if !value.trim().is_empty() {
                        fields.insert(header.to_string(), value.to_string());
                    }
                }
                Some(Ok(NumberedRow {
                    row_number: self.row_number,
                    fields,
                }))
            }
            Err(error) => Some(Err(RowError {
                row_number: self.row_number,
                message: describe_csv_error(&error, self.headers.len()),
            })),
        }
    }
}

fn describe_csv_error(error: &csv::Error, header_len: usize) -> String {
    match error.kind() {
        csv::ErrorKind::UnequalLengths { expected_len, len, .. } => format!(
            "expected {expected_len} fields matching the header row, found {len}"
        ),
        _ => format!("malformed row (header declares {header_len} fields): {error}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFailure {
    /// The row could not be parsed against the header at all.
    Parse(String),
    /// The row parsed but one or more fields failed schema validation.
    Validation(Vec<FieldError>),
}

impl RowFailure {
    pub fn field_errors(&self) -> Vec<FieldError> {
        match self {
            Self::Parse(message) => vec![FieldError::new("row", message.clone())],
            Self::Validation(errors) => errors.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowOutcome {
    pub row_number: u64,
    pub result: Result<LicenseRecord, RowFailure>,
}

/// Adapts a row stream into per-row validation outcomes. A malformed row
/// aborts only that row; whether to halt the file or keep reporting remains
/// the caller's policy.
pub fn validated_rows<R: Read>(
    stream: CsvRowStream<R>,
    config: &SchemaConfig,
) -> ValidatedRows<'_, R> {
    ValidatedRows { stream, config }
}

pub struct ValidatedRows<'a, R: Read> {
    stream: CsvRowStream<R>,
    config: &'a SchemaConfig,
}

impl<R: Read> Iterator for ValidatedRows<'_, R> {
    type Item = RowOutcome;

    fn next(&mut self) -> Option<Self::Item> {
        match self.stream.next()? {
            Ok(row) => {
                let values: BTreeMap<String, Value> = row
                    .fields
                    .into_iter()
                    .map(|(field, value)| (field, Value::String(value)))
                    .collect();
                let result = validate_row(&values, self.config)
                    .map_err(RowFailure::Validation);
                Some(RowOutcome {
                    row_number: row.row_number,
                    result,
                })
            }
            Err(error) => Some(RowOutcome {
                row_number: error.row_number,
                result: Err(RowFailure::Parse(error.message)),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "compact,jurisdiction,licenseType,status,givenName,middleName,familyName,ssn,npi,dateOfIssuance,dateOfRenewal,dateOfExpiration,dateOfBirth,homeAddressStreet1,homeAddressStreet2,homeAddressCity,homeAddressState,homeAddressPostalCode,emailAddress,phoneNumber,militaryWaiver";

    const VALID_ROW: &str = "aslp,oh,audiologist,active,Joe,,Dokes,123-45-6789,,2010-06-06,2024-06-06,2025-06-06,1985-06-06,1640 Riverside Drive,,Hill Valley,oh,43004,,,";

    fn test_config() -> SchemaConfig {
        SchemaConfig::new(["aslp"], ["oh", "ky"])
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
    fn drops_blank_fields_before_validation() {
        let body = upload(&[VALID_ROW]);
        let mut stream = CsvRowStream::new(body.as_slice()).expect("header should parse");

        let row = stream
            .next()
            .expect("one data row")
            .expect("row should parse");
        assert_eq!(row.row_number, 1);
        assert!(!row.fields.contains_key("middleName"));
        assert!(!row.fields.contains_key("npi"));
        assert!(row.fields.values().all(|value| !value.trim().is_empty()));
    }

    #[test]
    fn valid_rows_yield_normalized_records() {
        let body = upload(&[VALID_ROW]);
        let stream = CsvRowStream::new(body.as_slice()).expect("header should parse");
        let config = test_config();

        let outcomes: Vec<RowOutcome> = validated_rows(stream, &config).collect();
        assert_eq!(outcomes.len(), 1);
        let record = outcomes[0]
            .result
            .as_ref()
            .expect("row should validate");
        assert_eq!(record.given_name, "Joe");
        assert_eq!(record.middle_name, None);
    }

    #[test]
    fn row_with_extra_column_fails_strict_parsing() {
        let mut wide_row = String::from(VALID_ROW);
        wide_row.push_str(",surplus");
        let body = upload(&[wide_row.as_str(), VALID_ROW]);
        let stream = CsvRowStream::new(body.as_slice()).expect("header should parse");
        let config = test_config();

        let outcomes: Vec<RowOutcome> = validated_rows(stream, &config).collect();
        assert_eq!(outcomes.len(), 2);
        match &outcomes[0].result {
            Err(RowFailure::Parse(message)) => {
                assert!(message.contains("found 22"), "unexpected message: {message}");
            }
            other => panic!("expected parse failure, got {other:?}"),
        }
        assert!(outcomes[1].result.is_ok(), "later rows should still parse");
    }

    #[test]
    fn missing_required_field_reports_the_field_name() {
        let row_without_ssn = VALID_ROW.replace("123-45-6789", "");
        let body = upload(&[row_without_ssn.as_str()]);
        let stream = CsvRowStream::new(body.as_slice()).expect("header should parse");
        let config = test_config();

        let outcomes: Vec<RowOutcome> = validated_rows(stream, &config).collect();
        match &outcomes[0].result {
            Err(RowFailure::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "ssn");
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn quoted_commas_stay_within_one_field() {
        let quoted = VALID_ROW.replace(
            "1640 Riverside Drive",
            "\"1640 Riverside Drive, Rear Entrance\"",
        );
        let body = upload(&[quoted.as_str()]);
        let stream = CsvRowStream::new(body.as_slice()).expect("header should parse");
        let config = test_config();

        let outcomes: Vec<RowOutcome> = validated_rows(stream, &config).collect();
        let record = outcomes[0].result.as_ref().expect("row should validate");
        assert_eq!(
            record.home_address_street1,
            "1640 Riverside Drive, Rear Entrance"
        );
    }

    #[test]
    fn reparsing_the_same_bytes_yields_identical_outcomes() {
        let bad_row = VALID_ROW.replace("123-45-6789", "not-an-ssn");
        let body = upload(&[VALID_ROW, bad_row.as_str()]);
        let config = test_config();

        let first: Vec<RowOutcome> = validated_rows(
            CsvRowStream::new(body.as_slice()).expect("header should parse"),
            &config,
        )
        .collect();
        let second: Vec<RowOutcome> = validated_rows(
            CsvRowStream::new(body.as_slice()).expect("header should parse"),
            &config,
        )
        .collect();

        assert_eq!(first, second);
    }
}
