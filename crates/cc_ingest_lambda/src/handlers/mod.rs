pub mod bulk_upload;
pub mod license_api;
