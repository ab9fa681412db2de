pub mod dynamo;
pub mod event_store;
pub mod license_store;
pub mod upload_source;
