//! Error types for the clubsync engine.

use thiserror::Error;

/// All possible errors from the clubsync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Key errors
    #[error("unknown key: {0}")]
    UnknownKey(String),

    // Persistence errors
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization failed for '{key}': {reason}")]
    Serialization { key: String, reason: String },

    // Domain errors
    #[error("event not found: {0}")]
    EventNotFound(String),

    #[error("backup not found: {0}")]
    BackupNotFound(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(u64),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::UnknownKey("players".into());
        assert_eq!(err.to_string(), "unknown key: players");

        let err = Error::Serialization {
            key: "roster".into(),
            reason: "key must be a string".into(),
        };
        assert_eq!(
            err.to_string(),
            "serialization failed for 'roster': key must be a string"
        );

        let err = Error::Storage("disk full".into());
        assert_eq!(err.to_string(), "storage error: disk full");
    }
}
