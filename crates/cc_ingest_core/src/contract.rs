use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const LICENSE_RECORD_SCHEMA_VERSION: &str = "v1";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const SSN_GROUP_LENGTHS: [usize; 3] = [3, 2, 4];
const NPI_LENGTH: usize = 10;

const KNOWN_FIELDS: &[&str] = &[
    "compact",
    "jurisdiction",
    "licenseType",
    "status",
    "givenName",
    "middleName",
    "familyName",
    "suffix",
    "ssn",
    "npi",
    "dateOfIssuance",
    "dateOfRenewal",
    "dateOfExpiration",
    "dateOfBirth",
    "homeAddressStreet1",
    "homeAddressStreet2",
    "homeAddressCity",
    "homeAddressState",
    "homeAddressPostalCode",
    "emailAddress",
    "phoneNumber",
    "militaryWaiver",
];

/// Compacts and the license types they recognize. Compacts are enabled per
/// deployment through [`SchemaConfig`]; the type vocabulary itself is fixed
/// by the interstate agreements.
const COMPACT_LICENSE_TYPES: &[(&str, &[&str])] = &[
    ("aslp", &["audiologist", "speech-language pathologist"]),
    (
        "octp",
        &["occupational therapist", "occupational therapy assistant"],
    ),
    ("coun", &["licensed professional counselor"]),
];

pub fn license_types_for(compact: &str) -> Option<&'static [&'static str]> {
    COMPACT_LICENSE_TYPES
        .iter()
        .find(|(name, _)| *name == compact)
        .map(|(_, types)| *types)
}

/// Deployment-level allowlists for compacts and jurisdictions, sourced from
/// environment configuration in the binaries. Values are normalized to
/// lowercase on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaConfig {
    compacts: Vec<String>,
    jurisdictions: Vec<String>,
}

impl SchemaConfig {
    pub fn new(
        compacts: impl IntoIterator<Item = impl Into<String>>,
        jurisdictions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            compacts: normalize_allowlist(compacts),
            jurisdictions: normalize_allowlist(jurisdictions),
        }
    }

    pub fn allows_compact(&self, compact: &str) -> bool {
        self.compacts.iter().any(|value| value == compact)
    }

    pub fn allows_jurisdiction(&self, jurisdiction: &str) -> bool {
        self.jurisdictions.iter().any(|value| value == jurisdiction)
    }
}

fn normalize_allowlist(values: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.into().trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Inactive,
}

impl LicenseStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

/// A validated, normalized license record. Optional fields given as blank
/// strings on the wire are absent here; no field of a validated record is
/// ever an empty string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRecord {
    pub compact: String,
    pub jurisdiction: String,
    pub license_type: String,
    pub status: LicenseStatus,
    pub given_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    pub family_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    pub ssn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub npi: Option<String>,
    pub date_of_issuance: NaiveDate,
    pub date_of_renewal: NaiveDate,
    pub date_of_expiration: NaiveDate,
    pub date_of_birth: NaiveDate,
    pub home_address_street1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_address_street2: Option<String>,
    pub home_address_city: String,
    pub home_address_state: String,
    pub home_address_postal_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub military_waiver: Option<bool>,
}

/// One validation failure, naming the offending field and the reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validates one loosely-typed row mapping against the license field schema.
///
/// Blank-string and null values are treated as absent before any check runs.
/// All field failures are collected rather than stopping at the first, so a
/// caller can report the full shape of a bad row. The input is never
/// mutated.
pub fn validate_row(
    values: &BTreeMap<String, Value>,
    config: &SchemaConfig,
) -> Result<LicenseRecord, Vec<FieldError>> {
    let mut row = RowFields::new(values);

    for field in values.keys() {
        if !KNOWN_FIELDS.contains(&field.as_str()) {
            row.push(field, "unexpected field");
        }
    }

    let compact = row.required_string("compact").map(|v| v.to_lowercase());
    if let Some(compact) = &compact {
        if !config.allows_compact(compact) {
            row.push("compact", format!("'{compact}' is not a configured compact"));
        }
    }

    let jurisdiction = row
        .required_string("jurisdiction")
        .map(|v| v.to_lowercase());
    if let Some(jurisdiction) = &jurisdiction {
        if !config.allows_jurisdiction(jurisdiction) {
            row.push(
                "jurisdiction",
                format!("'{jurisdiction}' is not a configured jurisdiction"),
            );
        }
    }

    let license_type = row.required_string("licenseType").map(|v| v.to_lowercase());
    if let (Some(compact), Some(license_type)) = (&compact, &license_type) {
        if let Some(types) = license_types_for(compact) {
            if !types.contains(&license_type.as_str()) {
                row.push(
                    "licenseType",
                    format!("'{license_type}' is not a license type in the {compact} compact"),
                );
            }
        }
    }

    let status = match row.required_string("status") {
        Some(text) => match LicenseStatus::parse(&text) {
            Some(status) => Some(status),
            None => {
                row.push("status", format!("'{text}' is not one of: active, inactive"));
                None
            }
        },
        None => None,
    };

    let given_name = row.required_string("givenName");
    let middle_name = row.optional_string("middleName");
    let family_name = row.required_string("familyName");
    let suffix = row.optional_string("suffix");

    let ssn = match row.required_string("ssn") {
        Some(text) if is_valid_ssn(&text) => Some(text),
        Some(_) => {
            row.push("ssn", "must be formatted ddd-dd-dddd");
            None
        }
        None => None,
    };

    let npi = match row.optional_string("npi") {
        Some(text) if is_valid_npi(&text) => Some(text),
        Some(_) => {
            row.push("npi", format!("must be {NPI_LENGTH} digits"));
            None
        }
        None => None,
    };

    let date_of_issuance = row.required_date("dateOfIssuance");
    let date_of_renewal = row.required_date("dateOfRenewal");
    let date_of_expiration = row.required_date("dateOfExpiration");
    let date_of_birth = row.required_date("dateOfBirth");

    let home_address_street1 = row.required_string("homeAddressStreet1");
    let home_address_street2 = row.optional_string("homeAddressStreet2");
    let home_address_city = row.required_string("homeAddressCity");
    let home_address_state = row
        .required_string("homeAddressState")
        .map(|v| v.to_lowercase());

    let home_address_postal_code = match row.required_string("homeAddressPostalCode") {
        Some(text) if is_valid_postal_code(&text) => Some(text),
        Some(_) => {
            row.push("homeAddressPostalCode", "must be formatted ddddd or ddddd-dddd");
            None
        }
        None => None,
    };

    let email_address = match row.optional_string("emailAddress") {
        Some(text) if is_valid_email(&text) => Some(text),
        Some(_) => {
            row.push("emailAddress", "must be an email address");
            None
        }
        None => None,
    };

    let phone_number = row.optional_string("phoneNumber");
    let military_waiver = row.optional_bool("militaryWaiver");

    if !row.errors.is_empty() {
        return Err(row.errors);
    }

    // All required accessors recorded an error on failure, so the unwraps
    // below are unreachable when the error list is empty.
    Ok(LicenseRecord {
        compact: compact.unwrap_or_default(),
        jurisdiction: jurisdiction.unwrap_or_default(),
        license_type: license_type.unwrap_or_default(),
        status: status.unwrap_or(LicenseStatus::Inactive),
        given_name: given_name.unwrap_or_default(),
        middle_name,
        family_name: family_name.unwrap_or_default(),
        suffix,
        ssn: ssn.unwrap_or_default(),
        npi,
        date_of_issuance: date_of_issuance.unwrap_or_default(),
        date_of_renewal: date_of_renewal.unwrap_or_default(),
        date_of_expiration: date_of_expiration.unwrap_or_default(),
        date_of_birth: date_of_birth.unwrap_or_default(),
        home_address_street1: home_address_street1.unwrap_or_default(),
        home_address_street2,
        home_address_city: home_address_city.unwrap_or_default(),
        home_address_state: home_address_state.unwrap_or_default(),
        home_address_postal_code: home_address_postal_code.unwrap_or_default(),
        email_address,
        phone_number,
        military_waiver,
    })
}

struct RowFields<'a> {
    values: &'a BTreeMap<String, Value>,
    errors: Vec<FieldError>,
}

impl<'a> RowFields<'a> {
    fn new(values: &'a BTreeMap<String, Value>) -> Self {
        Self {
            values,
            errors: Vec::new(),
        }
    }

    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    fn present(&self, field: &str) -> Option<&'a Value> {
        self.values.get(field).filter(|value| !is_absent(value))
    }

    fn required_string(&mut self, field: &str) -> Option<String> {
        match self.present(field) {
            Some(Value::String(text)) => Some(text.trim().to_string()),
            Some(_) => {
                self.push(field, "must be a string");
                None
            }
            None => {
                self.push(field, "required field is missing");
                None
            }
        }
    }

    fn optional_string(&mut self, field: &str) -> Option<String> {
        match self.present(field) {
            Some(Value::String(text)) => Some(text.trim().to_string()),
            Some(_) => {
                self.push(field, "must be a string");
                None
            }
            None => None,
        }
    }

    fn required_date(&mut self, field: &str) -> Option<NaiveDate> {
        let text = self.required_string(field)?;
        match NaiveDate::parse_from_str(&text, DATE_FORMAT) {
            Ok(date) => Some(date),
            Err(_) => {
                self.push(field, "must be a date formatted YYYY-MM-DD");
                None
            }
        }
    }

    fn optional_bool(&mut self, field: &str) -> Option<bool> {
        match self.present(field) {
            Some(Value::Bool(flag)) => Some(*flag),
            Some(Value::String(text)) => match parse_bool(text) {
                Some(flag) => Some(flag),
                None => {
                    self.push(field, "must be a boolean");
                    None
                }
            },
            Some(_) => {
                self.push(field, "must be a boolean");
                None
            }
            None => None,
        }
    }
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "y" | "yes" => Some(true),
        "false" | "n" | "no" => Some(false),
        _ => None,
    }
}

fn is_valid_ssn(text: &str) -> bool {
    let groups: Vec<&str> = text.split('-').collect();
    groups.len() == SSN_GROUP_LENGTHS.len()
        && groups
            .iter()
            .zip(SSN_GROUP_LENGTHS)
            .all(|(group, length)| group.len() == length && is_all_digits(group))
}

fn is_valid_npi(text: &str) -> bool {
    text.len() == NPI_LENGTH && is_all_digits(text)
}

fn is_valid_postal_code(text: &str) -> bool {
    match text.split_once('-') {
        None => text.len() == 5 && is_all_digits(text),
        Some((zip, plus_four)) => {
            zip.len() == 5 && is_all_digits(zip) && plus_four.len() == 4 && is_all_digits(plus_four)
        }
    }
}

fn is_valid_email(text: &str) -> bool {
    matches!(text.split_once('@'), Some((local, domain)) if !local.is_empty() && !domain.is_empty())
}

fn is_all_digits(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}
