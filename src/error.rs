use std::{path::PathBuf, time::Duration};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("source unavailable: {}: {source}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("embedding failure: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index for collection '{collection}' has not been built; reindex required")]
    IndexNotBuilt { collection: String },

    #[error(
        "index for collection '{collection}' is stale (stored fingerprint {stored}, expected {expected})"
    )]
    FingerprintMismatch {
        collection: String,
        stored: String,
        expected: String,
    },

    #[error("invalid chunking parameters: {0}")]
    InvalidChunking(String),

    #[error("invalid page map: {0}")]
    InvalidPageMap(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

/// Failure reported by an embedding provider.
///
/// `Transient` and `Timeout` are worth retrying; `Fatal` is not.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),

    #[error("fatal provider error: {0}")]
    Fatal(String),
}

impl EmbeddingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}
