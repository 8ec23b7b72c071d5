use rusqlite::ErrorCode;

/// Errors surfaced by the storage layer.
///
/// The taxonomy matters to callers: [`StorageError::Closed`] fences every
/// call after `flush_and_close`, transient connection-class errors are
/// retried internally on the 1-3-5 second schedule, and everything else is
/// fatal and surfaced immediately.
///
/// # Examples
///
/// ```rust
/// use metrion_storage::error::StorageError;
///
/// let err = StorageError::Closed;
/// assert!(!err.is_transient());
/// assert!(err.to_string().contains("closed"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The store was closed by `flush_and_close`; no I/O was performed.
    #[error("storage: store is closed")]
    Closed,

    /// A metric name was empty.
    #[error("storage: metric name must not be empty")]
    EmptyName,

    /// A connection-class failure that exhausted the retry schedule, or a
    /// synthetic transient error injected by tests.
    #[error("storage: transient backend error: {0}")]
    Transient(String),

    /// An underlying SQLite error.
    #[error("storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Snapshot serialization or deserialization failure.
    #[error("storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot file I/O failure.
    #[error("storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic storage error for cases not covered by other variants.
    #[error("storage: {0}")]
    Other(String),
}

impl StorageError {
    /// Whether the error belongs to the connection-exception class that the
    /// retry combinator is allowed to re-attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Transient(_) => true,
            StorageError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen
            ),
            _ => false,
        }
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
