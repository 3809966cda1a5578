//! Error types for the simulation engine.
//!
//! Only construction, control-verb parsing and the runners' I/O are fallible.
//! A running tick never returns an error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error(transparent)]
    Parse(#[from] telemetry::ParseError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
