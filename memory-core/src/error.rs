//! Error taxonomy for the tiered memory engine.
//!
//! One flat enum, matching every kind the dispatcher maps onto the wire
//! protocol. Storage and cache failures wrap their cause; everything else
//! carries a short human-readable message.

use crate::types::MemoryId;

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the engine.
///
/// Variants map 1:1 onto the error taxonomy the dispatcher exposes over
/// JSON-RPC; see `memory-mcp::server` for the mapping to wire error codes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Argument missing, wrong type, out of range, or schema mismatch.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Referenced id does not exist.
    #[error("memory not found: {0}")]
    NotFound(MemoryId),

    /// Duplicate write blocked by deduplication.
    #[error("duplicate content blocked write: {0}")]
    Conflict(String),

    /// Content exceeds tier-specific size limit.
    #[error("content too large: {0}")]
    TooLarge(String),

    /// Cache cannot make room even after eviction.
    #[error("cache full: {0}")]
    CacheFull(String),

    /// Backend I/O failure; the operation made no durable change.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// On-disk schema version not supported.
    #[error("schema mismatch: found {found}, expected {expected}")]
    SchemaMismatch {
        /// Version recorded in the database `meta` table.
        found: i64,
        /// Version this build expects.
        expected: i64,
    },

    /// Per-method rate bucket exhausted.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Caller cancelled or request deadline exceeded.
    #[error("cancelled")]
    Cancelled,

    /// Unexpected invariant violation.
    #[error("internal error: {0}")]
    Internal(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Underlying I/O failure (config/backup file handling).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a caller can retry this error with backoff.
    ///
    /// Per the propagation policy, only transient I/O is retried (at most
    /// once, exponential backoff capped at 250 ms); everything else
    /// surfaces immediately.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_) | Error::Io(_))
    }

    /// Short machine-readable kind name, used by the dispatcher's error
    /// mapping and in log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidParams(_) => "InvalidParams",
            Error::NotFound(_) => "NotFound",
            Error::Conflict(_) => "Conflict",
            Error::TooLarge(_) => "TooLarge",
            Error::CacheFull(_) => "CacheFull",
            Error::StorageUnavailable(_) => "StorageUnavailable",
            Error::SchemaMismatch { .. } => "SchemaMismatch",
            Error::RateLimited(_) => "RateLimited",
            Error::Cancelled => "Cancelled",
            Error::Internal(_) => "Internal",
            Error::Serialization(_) => "InvalidParams",
            Error::Configuration(_) => "Internal",
            Error::Io(_) => "StorageUnavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_unavailable_is_recoverable() {
        let err = Error::StorageUnavailable("disk full".to_string());
        assert!(err.is_recoverable());
    }

    #[test]
    fn not_found_is_not_recoverable() {
        let err = Error::NotFound(MemoryId::new());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn kind_names_match_taxonomy() {
        assert_eq!(Error::Cancelled.kind(), "Cancelled");
        assert_eq!(
            Error::SchemaMismatch {
                found: 1,
                expected: 2
            }
            .kind(),
            "SchemaMismatch"
        );
    }
}
