//! Unified error types for Bulwark

use thiserror::Error;

use crate::types::FailureClass;

/// Unified error type for all Bulwark operations
#[derive(Error, Debug)]
pub enum BulwarkError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing credentials or configuration detected before any external call
    #[error("Fatal: {0}")]
    Fatal(String),

    // Dependency errors
    #[error("Git error: {0}")]
    Git(String),

    #[error("GitHub error: {0}")]
    GitHub(String),

    #[error("API error: {0}")]
    Api(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl BulwarkError {
    /// Whether this error aborts the run before any external call is attempted
    pub fn is_fatal(&self) -> bool {
        self.failure_class().is_some()
    }

    /// `FailureClass::Fatal` for pre-flight errors, `None` otherwise
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            BulwarkError::Fatal(message) | BulwarkError::Config(message) => {
                Some(FailureClass::Fatal {
                    message: message.clone(),
                })
            }
            _ => None,
        }
    }
}

/// Result type alias using BulwarkError
pub type Result<T> = std::result::Result<T, BulwarkError>;
