use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::Value;

use crate::adapters::event_store::EventStore;
use crate::adapters::license_store::LicenseStore;
use crate::runtime::contract::{LicenseRecord, LICENSE_RECORD_SCHEMA_VERSION};
use crate::runtime::events::DataEventRecord;
use crate::runtime::storage_keys::{
    event_partition_key, event_sort_key, license_partition_key, license_sort_key,
};

pub struct DynamoLicenseStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoLicenseStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

impl LicenseStore for DynamoLicenseStore {
    fn put_license(&self, record: &LicenseRecord) -> Result<(), String> {
        let item = license_item(record)?;
        put_item(&self.client, &self.table_name, item)
    }
}

pub struct DynamoEventStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoEventStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

impl EventStore for DynamoEventStore {
    fn put_event(&self, record: &DataEventRecord) -> Result<(), String> {
        put_item(&self.client, &self.table_name, event_item(record))
    }
}

fn put_item(
    client: &aws_sdk_dynamodb::Client,
    table_name: &str,
    item: HashMap<String, AttributeValue>,
) -> Result<(), String> {
    let client = client.clone();
    let table_name = table_name.to_string();

    tokio::task::block_in_place(|| {
        tokio::runtime::Handle::current().block_on(async move {
            client
                .put_item()
                .table_name(table_name)
                .set_item(Some(item))
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to put item to dynamodb: {error}"))
        })
    })
}

/// Flattens a validated record into a DynamoDB item under its composite key.
/// Optional fields that were absent stay absent; no attribute is ever an
/// empty string.
pub fn license_item(record: &LicenseRecord) -> Result<HashMap<String, AttributeValue>, String> {
    let value = serde_json::to_value(record)
        .map_err(|error| format!("failed to serialize license record: {error}"))?;
    let Some(object) = value.as_object() else {
        return Err("license record did not serialize to an object".to_string());
    };

    let mut item = HashMap::with_capacity(object.len() + 3);
    item.insert(
        "pk".to_string(),
        AttributeValue::S(license_partition_key(&record.compact, &record.ssn)),
    );
    item.insert(
        "sk".to_string(),
        AttributeValue::S(license_sort_key(&record.jurisdiction, &record.license_type)),
    );
    item.insert(
        "recordSchema".to_string(),
        AttributeValue::S(LICENSE_RECORD_SCHEMA_VERSION.to_string()),
    );
    for (field, value) in object {
        let attribute = match value {
            Value::String(text) => AttributeValue::S(text.clone()),
            Value::Bool(flag) => AttributeValue::Bool(*flag),
            other => AttributeValue::S(other.to_string()),
        };
        item.insert(field.clone(), attribute);
    }
    Ok(item)
}

pub fn event_item(record: &DataEventRecord) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (
            "pk".to_string(),
            AttributeValue::S(event_partition_key(&record.compact, &record.event_type)),
        ),
        (
            "sk".to_string(),
            AttributeValue::S(event_sort_key(&record.event_time, &record.event_id)),
        ),
        (
            "compact".to_string(),
            AttributeValue::S(record.compact.clone()),
        ),
        (
            "jurisdiction".to_string(),
            AttributeValue::S(record.jurisdiction.clone()),
        ),
        (
            "eventType".to_string(),
            AttributeValue::S(record.event_type.clone()),
        ),
        (
            "eventId".to_string(),
            AttributeValue::S(record.event_id.clone()),
        ),
        (
            "eventTime".to_string(),
            AttributeValue::S(record.event_time.clone()),
        ),
        (
            "ttl".to_string(),
            AttributeValue::N(record.ttl_epoch_seconds.to_string()),
        ),
        (
            "recordSchema".to_string(),
            AttributeValue::S(record.record_schema.clone()),
        ),
        (
            "detail".to_string(),
            AttributeValue::S(record.detail.to_string()),
        ),
    ])
}
