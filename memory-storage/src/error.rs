//! Error-context helpers bridging libsql's error type onto
//! `memory_core::Error::StorageUnavailable` without losing the cause.

use memory_core::Error;

/// Wrap a libsql (or other) error as a storage error, preserving its
/// message as context.
pub fn storage_error<E: std::fmt::Display>(context: &str, error: E) -> Error {
    Error::StorageUnavailable(format!("{context}: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_context_and_cause() {
        let err = storage_error("failed to open database", "disk I/O error");
        let msg = err.to_string();
        assert!(msg.contains("failed to open database"));
        assert!(msg.contains("disk I/O error"));
    }
}
