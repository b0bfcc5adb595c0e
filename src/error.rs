//! Error types for the document relay.

use std::time::Duration;

use rust_decimal::Decimal;

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Ledger validation and persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid amount {amount} for {operation}")]
    InvalidAmount {
        operation: &'static str,
        amount: Decimal,
    },

    #[error("Invalid account id: {0:?}")]
    InvalidAccountId(String),

    #[error("Invalid role: {0:?}")]
    InvalidRole(String),

    #[error("Rate tag {tag:?} not found (existing: {})", existing.join(", "))]
    UnknownRate { tag: String, existing: Vec<String> },

    #[error("Rate tag {0:?} already exists")]
    RateExists(String),

    #[error("Account {id} changed concurrently; gave up after {attempts} attempts")]
    Conflict { id: String, attempts: u32 },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Transport-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to react on channel {name}: {reason}")]
    ReactFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Document text extraction errors. Never surfaces past the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Unsupported document type: {0}")]
    Unsupported(String),

    #[error("Document could not be decoded: {0}")]
    Decode(String),
}

/// Dispatch task failures. Logged, never retried.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Task {label} timed out after {timeout:?}")]
    Timeout { label: String, timeout: Duration },

    #[error("Task {label} failed: {reason}")]
    Failed { label: String, reason: String },
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
