//! Benchmark error types.

use thiserror::Error;

/// Benchmark errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The store could not be reached.
    #[error("connection error ({store}): {message}")]
    Connection {
        store: &'static str,
        message: String,
    },

    /// A seeding batch was rejected in whole or in part.
    ///
    /// `written` counts the records of the batch that did land.
    #[error("partial write ({store}): {failed} record(s) not written, {written} written: {reason}")]
    PartialWrite {
        store: &'static str,
        written: usize,
        failed: usize,
        reason: String,
    },

    /// The store rejected a query or returned something unreadable.
    #[error("query error ({store}): {message}")]
    Query {
        store: &'static str,
        message: String,
    },

    /// Query parameters are malformed.
    #[error("invalid query parameters: {0}")]
    InvalidQuery(String),

    /// Readiness polling ran out of attempts.
    #[error("services not ready after {attempts} attempt(s): {last_error}")]
    NotReady { attempts: u32, last_error: String },

    /// Building the async runtime failed.
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error means the store is unreachable.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }
}

/// Result type for benchmark operations.
pub type Result<T> = std::result::Result<T, Error>;
