/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use monty_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "endpoint",
///     id: "42".to_string(),
/// };
/// assert!(err.to_string().contains("endpoint"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An endpoint configuration failed validation. Maps to HTTP 400.
    #[error("{0}")]
    Validation(String),

    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// An insert succeeded but the row could not be read back, which should be
    /// unreachable under normal conditions.
    #[error("Storage: insert of {entity} succeeded but the row could not be read back")]
    InsertReadback { entity: &'static str },

    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failure (list columns).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic storage error for cases not covered by other variants.
    #[error("Storage: {0}")]
    Other(String),
}

impl StorageError {
    pub fn validation(msg: impl Into<String>) -> Self {
        StorageError::Validation(msg.into())
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
