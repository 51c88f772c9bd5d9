//! Error types for the persistent store.

use thiserror::Error;

/// Errors raised while reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying SQLite connection reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The data directory could not be created or accessed.
    #[error("data directory error: {0}")]
    DataDir(#[from] std::io::Error),

    /// A row contained data that could not be interpreted (bad hex, bad
    /// JSON, out-of-range timestamp).
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}
