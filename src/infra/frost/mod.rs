//! FROST SensorThings catalog over HTTP.

mod client;

pub use client::FrostClient;
