//! Error types for Tessera operations

use crate::api::ApiOperation;
use thiserror::Error;

/// Content API errors.
///
/// A missing entity is not an error: lookups return `Ok(None)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Request {operation} failed: {reason}")]
    RequestFailed {
        operation: ApiOperation,
        reason: String,
    },

    #[error("Publishing entry {id} failed: {reason}")]
    PublishFailed { id: String, reason: String },
}

/// Persisted store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store backend failure: {reason}")]
    Backend { reason: String },

    #[error("Failed to serialize value for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Failed to deserialize value for key {key}: {reason}")]
    Deserialization { key: String, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to initialize tracing: {reason}")]
    Tracing { reason: String },
}

/// Master error type for all Tessera errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TesseraError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Tessera operations.
pub type TesseraResult<T> = Result<T, TesseraError>;

/// Shorthand for a failed API request.
pub fn request_failed(operation: ApiOperation, reason: impl Into<String>) -> TesseraError {
    TesseraError::Api(ApiError::RequestFailed {
        operation,
        reason: reason.into(),
    })
}

// =============================================================================
// TESTS
// =============================================================================
