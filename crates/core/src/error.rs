//! Error types for promptloom.
//!
//! This module defines a unified error enum that covers all error categories
//! in the workspace: configuration, I/O, prompt assembly, rule compilation,
//! segment generation and serialization.

use thiserror::Error;

/// Unified error type for promptloom.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
/// Library code never panics on user input; errors are represented and
/// propagated to the boundary that knows how to degrade.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Prompt assembly errors (ordering, composition)
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Rule compilation and rewrite errors
    #[error("Transform error: {0}")]
    Transform(String),

    /// A segment generator failed to produce its segments
    #[error("Generator '{name}' failed: {message}")]
    Generator { name: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Build a generator error for the named generator.
    pub fn generator(name: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Generator {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
