//! Storage collaborator contract.

use crate::common::{Result, Vars};
use crate::storage::Query;

/// What a write statement reported back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    affected_rows: u64,
    insert_id: Option<u64>,
}

impl WriteOutcome {
    pub fn new(affected_rows: u64, insert_id: Option<u64>) -> Self {
        Self {
            affected_rows,
            insert_id,
        }
    }

    /// Rows touched by the statement.
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Value generated for an auto-increment column, if any.
    pub fn insert_id(&self) -> Option<u64> {
        self.insert_id
    }
}

/// Executes statements built by the engine.
///
/// Implementations are shared between contexts, so they take `&self` and
/// synchronise internally. Errors come back as [`Error::Storage`] and the
/// engine propagates them untouched.
///
/// [`Error::Storage`]: crate::Error::Storage
pub trait Database: Send + Sync {
    /// Run an INSERT, REPLACE, UPDATE or DELETE.
    fn execute(&self, query: &Query) -> Result<WriteOutcome>;

    /// Run a SELECT and return the matching rows.
    fn fetch(&self, query: &Query) -> Result<Vec<Vars>>;

    /// Run a SELECT and return the number of matching rows.
    fn count(&self, query: &Query) -> Result<u64> {
        Ok(self.fetch(query)?.len() as u64)
    }
}
