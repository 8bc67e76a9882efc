//! Runtime bootstrap: logging and metric descriptions.

pub mod error;
pub mod telemetry;
