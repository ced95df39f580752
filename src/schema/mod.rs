//! Schema layer - column descriptors and table definitions.
//!
//! # Components
//! - [`Column`] - the descriptor contract (storage mapping + lifecycle hooks)
//! - [`columns`] - built-in descriptors
//! - [`Table`] - ordered columns, cache flags and the memoized primary key
//! - [`EntityHooks`] - per-table hooks that run after the column hooks

mod column;
pub mod columns;
mod hooks;
mod table;

pub use column::{format_timestamp, Capability, Column, HookEnv, StoragePair};
pub use columns::{AutoIncrement, CreatedAt, CreatedBy, DeletedAt, DeletedBy, EditedAt, Field, Split};
pub use hooks::{EntityHooks, NoHooks};
pub use table::{Table, TableBuilder};
