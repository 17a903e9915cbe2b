//! Concrete clients for the external services.

pub mod frost;
pub mod keycloak;
pub mod thermicam;
