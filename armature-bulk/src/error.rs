//! Error types for bulk and scroll helpers.

use crate::outcome::Outcome;
use thiserror::Error;

/// Bulk helper error type.
#[derive(Error, Debug)]
pub enum BulkError {
    /// A whole request failed at the transport level.
    #[error("Transport error ({}): {message}", status.map_or_else(|| "N/A".to_string(), |s| s.to_string()))]
    Transport {
        /// HTTP status code, if the failure carried one.
        status: Option<u16>,
        /// Error message.
        message: String,
    },

    /// One or more documents in a batch failed to index.
    #[error(transparent)]
    BulkIndex(#[from] BulkIndexError),

    /// A scroll page reported failed shards.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A parallel worker task died.
    #[error("Worker error: {0}")]
    Worker(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client error from opensearch crate.
    #[error("Client error: {0}")]
    Client(#[from] opensearch::Error),
}

impl BulkError {
    /// HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            BulkError::Transport { status, .. } => *status,
            BulkError::Client(e) => e.status_code().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<TransportError> for BulkError {
    fn from(e: TransportError) -> Self {
        BulkError::Transport {
            status: e.status,
            message: e.message,
        }
    }
}

/// Failure reported by a [`Transport`](crate::Transport) call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    /// HTTP status code, if the server answered.
    pub status: Option<u16>,
    /// Error message.
    pub message: String,
}

impl TransportError {
    /// Error with an HTTP status.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Error raised before any response was received.
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Whether the store asked us to slow down.
    pub fn is_throttled(&self) -> bool {
        self.status == Some(429)
    }
}

/// Documents of a single batch that failed to index.
#[derive(Error, Debug, Clone)]
#[error("{} document(s) failed to index.", errors.len())]
pub struct BulkIndexError {
    /// The failed outcomes, in request order.
    pub errors: Vec<Outcome>,
}

/// A scroll page did not succeed on every shard.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ScanError {
    /// Scroll id of the page that reported the failure.
    pub scroll_id: Option<String>,
    /// Shard failure summary.
    pub message: String,
}

/// Result type alias for bulk helper operations.
pub type Result<T> = std::result::Result<T, BulkError>;
