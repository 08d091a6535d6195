use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PixsearchError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Please enter a search query.")]
    Validation,

    #[error("No images found for '{query}'. Try a different query.")]
    NoResults { query: String },

    #[error("A network error occurred or the server response was invalid: {0}")]
    Network(String),

    #[error("Failed to load image '{url}': {reason}")]
    ImageLoad { url: String, reason: String },

    #[error("Index {index} is out of range for {len} results")]
    Index { index: usize, len: usize },

    #[error("Invalid shareable URL: {0}")]
    ShareUrl(String),

    #[error("Preference error: {0}")]
    Preferences(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Clipboard error: {0}")]
    Clipboard(#[from] arboard::Error),

    #[error("An unexpected error occurred: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl PixsearchError {
    /// Errors the user can recover from by simply trying again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PixsearchError::Network(_))
    }
}

impl From<reqwest::Error> for PixsearchError {
    fn from(err: reqwest::Error) -> Self {
        PixsearchError::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PixsearchError>;
