//! Error types for the crpt-gate client.

use thiserror::Error;

/// Raised when a caller gives up waiting for a rate limit grant.
///
/// No grant is consumed by a cancelled wait.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cancelled while waiting for a rate limit grant")]
pub struct Cancelled;

/// Main error type for crpt-gate operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A rate limit window with a zero limit or a zero period
    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfiguration(String),

    /// The caller was cancelled before a grant was issued
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The document API answered with something other than 200
    #[error("Document API rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error came from a cancelled wait rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

/// Result type alias for crpt-gate operations.
pub type Result<T> = std::result::Result<T, Error>;
