//! Error types for heaplens-checker
//!
//! Provides unified error handling across the crate.
//!
//! Note that *diagnostics about the analyzed program* are not errors: they
//! travel as [`crate::features::heap_lifecycle::domain::Report`] values
//! through the checker context. `CheckerError` is reserved for misuse of the
//! engine contracts and invalid configuration.

use thiserror::Error;

/// Main error type for heaplens-checker operations
#[derive(Debug, Error)]
pub enum CheckerError {
    /// A call event did not have the shape its classification promised
    /// (e.g. a deallocator call with no arguments).
    #[error("Malformed call event: {0}")]
    MalformedCall(String),

    /// An engine contract was violated by the host.
    #[error("Engine contract violation: {0}")]
    EngineContract(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CheckerError {
    /// Create a malformed-call error
    pub fn malformed_call(msg: impl Into<String>) -> Self {
        CheckerError::MalformedCall(msg.into())
    }

    /// Create an engine-contract error
    pub fn engine(msg: impl Into<String>) -> Self {
        CheckerError::EngineContract(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        CheckerError::Config(msg.into())
    }
}

/// Result type alias for checker operations
pub type Result<T> = std::result::Result<T, CheckerError>;
