//! Error type shared by every component in the crate.

use thiserror::Error;

/// Errors raised while constructing components or running forward passes.
///
/// Every variant is a defect in configuration or input shape; nothing in
/// this crate retries.
#[derive(Debug, Error)]
pub enum AttentionError {
    /// Incompatible dimensions or probabilities detected at construction.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Input tensor does not fit the component it was passed to.
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// Token id is not a row of the embedding table.
    #[error("token id {id} out of range for vocabulary of {vocab_size}")]
    TokenOutOfRange { id: u32, vocab_size: usize },

    /// Failure reported by an external tokenizer.
    #[error("tokenizer failed: {0}")]
    Tokenizer(String),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

impl AttentionError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AttentionError>;
