//! Error types for blescan
//!
//! Runtime operations (intents, driver callbacks, event delivery) never fail;
//! these errors only come out of construction, validation and parsing.

use thiserror::Error;

/// Core blescan errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScannerError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing component: {0}")]
    MissingComponent(&'static str),

    // Advertisement record errors
    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Malformed advertisement record at offset {offset}: {reason}")]
    MalformedRecord { offset: usize, reason: &'static str },

    // Runtime errors
    #[error("No async runtime available: {0}")]
    NoRuntime(String),
}

/// Result type for blescan operations
pub type ScannerResult<T> = Result<T, ScannerError>;
