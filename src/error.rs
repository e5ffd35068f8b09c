//! Error types for the CRPT client.

use thiserror::Error;

/// Errors produced by the admission gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// Non-positive window or capacity at construction.
    #[error("Invalid gate configuration: {0}")]
    InvalidConfiguration(String),

    /// The wait for a permit was aborted before a permit was granted.
    #[error("Wait for admission was cancelled")]
    Cancelled,
}

/// Main error type for client operations.
#[derive(Error, Debug)]
pub enum CrptError {
    /// Admission gate errors
    #[error("Admission error: {0}")]
    Gate(#[from] GateError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload encoding errors
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrptError {
    /// Whether this error came from a cancelled admission wait.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CrptError::Gate(GateError::Cancelled))
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, CrptError>;
