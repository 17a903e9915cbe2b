pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod infra;
pub mod pipeline;
pub mod registry;
pub mod samples;
pub mod services;
