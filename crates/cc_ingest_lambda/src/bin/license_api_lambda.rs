use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

use cc_ingest_lambda::adapters::dynamo::{DynamoEventStore, DynamoLicenseStore};
use cc_ingest_lambda::handlers::license_api::{
    handle_post_licenses, ApiGatewayResponse, LicenseApiConfig,
};
use cc_ingest_lambda::runtime::contract::SchemaConfig;
use cc_ingest_lambda::runtime::events::{EventClock, DEFAULT_EVENT_RETENTION_DAYS};

async fn handle_request(event: LambdaEvent<Value>) -> Result<ApiGatewayResponse, Error> {
    let license_table = std::env::var("LICENSE_TABLE_NAME")
        .map_err(|_| Error::from("LICENSE_TABLE_NAME must be configured"))?;
    let event_table = std::env::var("DATA_EVENT_TABLE_NAME")
        .map_err(|_| Error::from("DATA_EVENT_TABLE_NAME must be configured"))?;
    let compacts =
        std::env::var("COMPACTS").map_err(|_| Error::from("COMPACTS must be configured"))?;
    let jurisdictions = std::env::var("JURISDICTIONS")
        .map_err(|_| Error::from("JURISDICTIONS must be configured"))?;
    let retention_days = retention_days_from_env()?;

    let now = Utc::now();
    let config = LicenseApiConfig {
        schema: SchemaConfig::new(compacts.split(','), jurisdictions.split(',')),
        clock: EventClock {
            event_time: now.to_rfc3339(),
            epoch_seconds: now.timestamp(),
        },
        retention_days,
    };

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let dynamo_client = aws_sdk_dynamodb::Client::new(&aws_config);
    let licenses = DynamoLicenseStore::new(dynamo_client.clone(), license_table);
    let events = DynamoEventStore::new(dynamo_client, event_table);

    Ok(handle_post_licenses(event.payload, &config, &licenses, &events))
}

fn retention_days_from_env() -> Result<i64, Error> {
    match std::env::var("EVENT_RETENTION_DAYS") {
        Ok(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::from("EVENT_RETENTION_DAYS must be an integer number of days")),
        Err(_) => Ok(DEFAULT_EVENT_RETENTION_DAYS),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}
