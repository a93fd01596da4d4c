//! Infrastructure: telemetry bootstrap and infrastructure-level errors.

pub mod error;
pub mod telemetry;

pub use error::InfraError;
