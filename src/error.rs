//! Error types for photo-dl
//!
//! Two layers of errors exist:
//! - [`Error`] covers setup failures (bad configuration, unreadable dataset,
//!   output directory that cannot be created). These abort a run before any
//!   fetch is dispatched.
//! - [`FetchError`] covers a single item's fetch. It never propagates past the
//!   batch engine; it is folded into a failed [`Outcome`](crate::types::Outcome).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for photo-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal error for photo-dl setup and I/O glue
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "batch.concurrency_limit")
        key: Option<String>,
    },

    /// Dataset file could not be read or parsed
    #[error("failed to load dataset {}: {reason}", path.display())]
    Dataset {
        /// Path of the dataset file
        path: PathBuf,
        /// Why loading failed
        reason: String,
    },

    /// Output directory could not be created or listed
    #[error("output directory {} is unusable: {source}", path.display())]
    OutputDir {
        /// Path of the output directory
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be constructed
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML configuration file could not be parsed
    #[error("config file parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl Error {
    /// Shorthand for a [`Error::Config`] tied to a specific key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Failure of one fetch attempt, or of all attempts for one item
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The remote rejected the request with a non-2xx status
    #[error("HTTP {code}")]
    HttpStatus {
        /// HTTP status code (429 = rate limited)
        code: u16,
    },

    /// Connectivity failure (timeout, connection reset, DNS)
    #[error("transport error: {message}")]
    Transport {
        /// Error text with the request URL stripped
        message: String,
        /// Whether the failure looks transient (timeout or connect failure)
        transient: bool,
    },

    /// The item's resource reference cannot form a request URL
    #[error("invalid resource reference {reference:?}: {reason}")]
    InvalidReference {
        /// The offending reference
        reference: String,
        /// Why it was rejected
        reason: String,
    },

    /// Writing the downloaded body to disk failed
    #[error("filesystem error: {message}")]
    Filesystem {
        /// Error text
        message: String,
    },

    /// Attempts ran out while the error was still retryable
    #[error("max retries exceeded after {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        /// Number of attempts made
        attempts: u32,
        /// The last concrete error observed
        last: Box<FetchError>,
    },

    /// The batch was cancelled before this item finished
    #[error("cancelled")]
    Cancelled,

    /// The task running this item panicked or was aborted
    #[error("task aborted: {0}")]
    TaskAborted(String),
}

/// HTTP status the media API uses to signal rate limiting
pub const RATE_LIMITED: u16 = 429;

impl FetchError {
    /// True for HTTP 429 responses
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::HttpStatus { code } if *code == RATE_LIMITED)
    }

    /// True for transport failures classified as transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Transport {
                transient: true,
                ..
            }
        )
    }

    /// Build a transport error from a reqwest failure, dropping the URL
    ///
    /// The request URL carries the API credential in its query string, so it
    /// must never reach an outcome or a log line.
    pub fn from_transport(err: reqwest::Error) -> Self {
        let transient = err.is_timeout() || err.is_connect();
        FetchError::Transport {
            message: err.without_url().to_string(),
            transient,
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Filesystem {
            message: err.to_string(),
        }
    }
}
