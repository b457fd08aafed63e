/// Errors from block store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A block could not be encoded for persistence.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A persisted line could not be decoded (1-based line number).
    #[error("corrupt block log at line {line}: {reason}")]
    CorruptLine { line: usize, reason: String },

    /// Another store already holds the writer lock for this log.
    #[error("block log is locked by another writer: {}", path.display())]
    Locked { path: std::path::PathBuf },

    /// A torn write could not be trimmed; the log needs repair before reuse.
    #[error("block log {} has an untrimmed partial write", path.display())]
    Poisoned { path: std::path::PathBuf },
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(e) => e.kind() != std::io::ErrorKind::PermissionDenied,
            Self::Serialization(_)
            | Self::CorruptLine { .. }
            | Self::Locked { .. }
            | Self::Poisoned { .. } => false,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn transient_classification() {
        assert!(StoreError::Io(io::Error::new(io::ErrorKind::Interrupted, "x")).is_transient());
        assert!(!StoreError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "x")).is_transient());
        assert!(!StoreError::Serialization("x".into()).is_transient());
        assert!(!StoreError::Poisoned { path: "l".into() }.is_transient());
        assert!(!StoreError::Locked { path: "l".into() }.is_transient());
    }

    #[test]
    fn corrupt_line_message_names_line() {
        let err = StoreError::CorruptLine {
            line: 7,
            reason: "expected value".into(),
        };
        assert_eq!(err.to_string(), "corrupt block log at line 7: expected value");
    }
}
