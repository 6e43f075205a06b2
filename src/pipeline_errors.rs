//! # Pipeline Error Types Module
//!
//! This module defines the error types surfaced by the extraction pipeline.
//! Parse failures and unresolved locations are not errors: they are
//! `ParseOutcome::Unparsed` lines and empty location strings respectively.

/// Custom error types for pipeline operations
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Invalid inbound message (no text and no attachments)
    Validation(String),
    /// AI extraction call failed (transport or non-2xx)
    Oracle(String),
    /// AI extraction returned JSON that does not match the response schema
    OracleSchema(String),
    /// An external call exceeded its deadline
    Timeout(String),
    /// Image download or decode failure
    Image(String),
    /// Record store failure
    Persistence(String),
    /// Oracle calls are suspended after repeated failures
    CircuitOpen(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Validation(msg) => write!(f, "Validation error: {msg}"),
            PipelineError::Oracle(msg) => write!(f, "Oracle error: {msg}"),
            PipelineError::OracleSchema(msg) => write!(f, "Oracle schema error: {msg}"),
            PipelineError::Timeout(msg) => write!(f, "Timeout error: {msg}"),
            PipelineError::Image(msg) => write!(f, "Image error: {msg}"),
            PipelineError::Persistence(msg) => write!(f, "Persistence error: {msg}"),
            PipelineError::CircuitOpen(msg) => write!(f, "Circuit open: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::OracleSchema(err.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PipelineError::Timeout(err.to_string())
        } else {
            PipelineError::Oracle(err.to_string())
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Persistence(err.to_string())
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Oracle(err.to_string())
    }
}

impl PipelineError {
    /// Whether retrying the same call might succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Oracle(_) | PipelineError::Timeout(_))
    }
}
