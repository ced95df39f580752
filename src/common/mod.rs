//! Common types and utilities shared across rowcache.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and [`EngineConfig`]
//! - Error types
//! - Identifiers ([`RowId`]) and row values ([`Vars`])

pub mod config;
pub mod error;
mod row_id;
pub mod vars;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use row_id::RowId;
pub use vars::Vars;
