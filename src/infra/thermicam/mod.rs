//! Upstream thermal camera telemetry API.

mod client;

pub use client::ThermiCamClient;
