pub mod catalog_api;
pub mod telemetry_api;
