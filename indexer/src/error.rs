//! Indexer error types and result alias.
//!
//! Every fallible indexer operation returns [`IndexerResult`]. The JSON-RPC
//! layer turns any [`IndexerError`] into a `-32000` error object carrying
//! its display text.

use thiserror::Error;

/// Result type alias for indexer operations.
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Errors raised while ingesting, storing or querying relations.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Configuration could not be read or holds an invalid value.
    #[error("config error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// The event source failed or returned something unusable.
    #[error("source error: {message}")]
    Source {
        /// Description of the failure.
        message: String,
    },

    /// Ledger RPC node answered with a JSON-RPC error.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the node.
        message: String,
    },

    /// HTTP transport failure talking to the ledger RPC node.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A change-log payload could not be decoded.
    #[error("malformed event: {message}")]
    Decode {
        /// Description of the problem.
        message: String,
    },

    /// A query filter was rejected.
    #[error("invalid filter: {message}")]
    InvalidFilter {
        /// Description of the problem.
        message: String,
    },

    /// Request parameters could not be parsed.
    #[error("invalid params: {message}")]
    InvalidParams {
        /// Description of the problem.
        message: String,
    },

    /// No relation is indexed at the requested leaf.
    #[error("no relation at leaf {leaf_index}")]
    NotFound {
        /// The requested leaf index.
        leaf_index: u32,
    },

    /// The mirror database holds something this build cannot read.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the problem.
        message: String,
    },

    /// Fjall database error.
    #[error("fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    /// The mirror disagrees with the tree state it claims to reflect.
    #[error("mirror inconsistent: {message}")]
    Inconsistent {
        /// Description of the mismatch.
        message: String,
    },

    /// The ledger cut a transaction's logs short, so events may be missing.
    #[error("logs truncated for transaction {signature} at slot {slot}")]
    LogTruncated {
        /// Slot of the transaction.
        slot: u64,
        /// Signature of the transaction.
        signature: String,
    },

    /// Local I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Record encoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IndexerError {
    pub fn source_error(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    pub fn decode_error(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::Inconsistent {
            message: message.into(),
        }
    }
}
