//! Error types for rowcache.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in rowcache.
///
/// Lookups that find nothing are the only recoverable case; the structural
/// variants signal a misconfigured table or call site and are returned
/// immediately without touching storage.
#[derive(Debug, Error)]
pub enum Error {
    /// A lookup found no row.
    #[error("{table} row {id} not found")]
    NotFound { table: String, id: String },

    /// An update-style write was attempted on an entity that is not persisted.
    #[error("cannot update unpersisted {table} entity")]
    UnpersistedWrite { table: String },

    /// A column name absent from the table's descriptors.
    #[error("unknown column {column} on table {table}")]
    UnknownColumn { table: String, column: String },

    /// A write was attempted on an entity without column data.
    ///
    /// This is a construction bug; no write statement is emitted.
    #[error("{table} entity has no column data to write")]
    EmptyRow { table: String },

    /// The number of id parts does not match the primary key.
    #[error("{table} expects {expected} primary key parts, got {got}")]
    InvalidId {
        table: String,
        expected: usize,
        got: usize,
    },

    /// An arithmetic update on a column that does not hold a number.
    #[error("column {column} holds non-numeric value {value:?}")]
    NotNumeric { column: String, value: Option<String> },

    /// Error reported by the storage layer, passed through unchanged.
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error from a file-backed cache.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cached payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a [`Error::NotFound`] for a table and id.
    pub fn not_found(table: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            table: table.into(),
            id: id.into(),
        }
    }

    /// Build a [`Error::UnknownColumn`].
    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// True for [`Error::NotFound`], the one variant call sites branch on.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
