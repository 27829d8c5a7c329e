//! Error types for the entire library.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in commands and main.rs.

use crate::registry::ContextId;
use thiserror::Error;

/// Errors raised by the context registry and the event aggregator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregatorError {
    #[error("Context {0} is already active")]
    DuplicateContext(ContextId),

    #[error("Context {0} is not active")]
    UnknownContext(ContextId),

    #[error("Span '{span}' is already open for context {context}")]
    DuplicateSpan { context: ContextId, span: String },

    #[error("No open span '{span}' for context {context}")]
    UnknownSpan { context: ContextId, span: String },

    #[error("Field '{field}' cannot hold that value: {reason}")]
    FieldTypeMismatch { field: String, reason: String },
}

/// Errors that can occur while delivering a finalized record to a sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to write record: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize record: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Record rejected by receiver: {0}")]
    Rejected(String),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFailed(#[from] std::io::Error),

    #[error("Config TOML parse error: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
