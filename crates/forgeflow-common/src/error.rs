//! Error types shared across Forgeflow crates

use thiserror::Error;

/// Result type alias for Forgeflow operations
pub type Result<T> = std::result::Result<T, ForgeflowError>;

/// Errors raised outside the pipeline proper: input files, payload decoding
/// and configuration.
#[derive(Error, Debug)]
pub enum ForgeflowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ForgeflowError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}
