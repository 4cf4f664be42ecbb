use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database is corrupted: {0}")]
    Corruption(String),

    #[error("cursor for stream '{stream}' would regress from {current} to {requested}")]
    CursorRegression {
        stream: String,
        current: u64,
        requested: u64,
    },
}

impl StoreError {
    /// Uniqueness violations abort a batch but are not backend failures.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}
