//! Error types for Trinity Flux
//!
//! The analytics functions are total and never fail; these errors cover
//! parsing, configuration, storage and encoding paths only.

use thiserror::Error;

/// Errors that can occur around the analytics core
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse samples: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<toml::de::Error> for ComputeError {
    fn from(e: toml::de::Error) -> Self {
        ComputeError::ConfigError(e.to_string())
    }
}

/// Validation errors for individual samples
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Sample id is empty")]
    EmptyId,

    #[error("Timestamp {0} is not a representable epoch millisecond")]
    InvalidTimestamp(i64),

    #[error("Value {dimension} is missing or not a finite number")]
    NonFiniteValue { dimension: char },

    #[error("Value {dimension}={value} is outside the 0-10 score range")]
    OutOfRange { dimension: char, value: f64 },

    #[error("Duplicate sample id: {0}")]
    DuplicateId(String),
}
