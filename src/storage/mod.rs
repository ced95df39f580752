//! Storage layer - the database collaborator and its query builder.
//!
//! This module handles everything that reaches the database:
//! - [`Query`] - statement builder with safe quoting
//! - [`Database`] - the executor contract
//! - [`MemoryDatabase`] - in-memory executor for tests and local runs

mod database;
mod memory;
mod query;

pub use database::{Database, WriteOutcome};
pub use memory::MemoryDatabase;
pub use query::{escape, quote, quote_identifier, Literal, Query, QueryKind};
