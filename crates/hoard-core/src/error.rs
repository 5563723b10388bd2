//! Error types for hoard.

use thiserror::Error;

/// Result type alias using hoard's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for hoard operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Page could not be retrieved
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Media extraction service answered with a non-success status.
    ///
    /// `body` is the response body, verbatim.
    #[error("Media extraction failed ({status}): {body}")]
    Extraction { status: u16, body: String },

    /// HTML could not be turned into a readable document or metadata
    #[error("Parse error: {0}")]
    Parse(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Render the error and its `source()` chain as one line.
    ///
    /// This is the text written to `error` columns when a resolver fails.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let cause_text = cause.to_string();
            if !out.contains(&cause_text) {
                out.push_str(": ");
                out.push_str(&cause_text);
            }
            source = cause.source();
        }
        out
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Request(format!("request timed out: {}", e))
        } else {
            Error::Request(e.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::InvalidInput(format!("invalid URL: {}", e))
    }
}
