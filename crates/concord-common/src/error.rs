//! Error types for Concord
//!
//! This module defines the error type used throughout the relation view engine.
//! Read paths never surface these to the UI: unknown rooms degrade to empty
//! views and malformed relations are skipped. They show up at the mutation
//! boundary, where they are folded into `{success: false, error}` results,
//! and at construction time (configuration, subscriptions).

use thiserror::Error;

/// Concord error types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConcordError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Room or event unknown locally
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The protocol client rejected a send or redaction
    #[error("Transport error: {0}")]
    Transport(String),

    /// Relation-shaped content that does not validate
    #[error("Malformed relation: {0}")]
    MalformedRelation(String),

    /// No session identity is bound to the client
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for Concord operations
pub type Result<T> = std::result::Result<T, ConcordError>;

impl ConcordError {
    /// The bare message, without the category prefix of `Display`.
    ///
    /// This is what the UI shows in a failed mutation result.
    pub fn message(&self) -> &str {
        match self {
            ConcordError::Config(msg)
            | ConcordError::Validation(msg)
            | ConcordError::NotFound(msg)
            | ConcordError::Transport(msg)
            | ConcordError::MalformedRelation(msg)
            | ConcordError::Auth(msg)
            | ConcordError::Serialization(msg)
            | ConcordError::Internal(msg) => msg,
        }
    }
}

impl From<serde_json::Error> for ConcordError {
    fn from(err: serde_json::Error) -> Self {
        ConcordError::Serialization(err.to_string())
    }
}

impl From<ruma::IdParseError> for ConcordError {
    fn from(err: ruma::IdParseError) -> Self {
        ConcordError::MalformedRelation(err.to_string())
    }
}
