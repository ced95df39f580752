//! rowcache - An identity-mapped row cache with a shared tier and deferred
//! cross-process invalidation.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            rowcache                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Entity Layer (entity/)                     │   │
//! │  │   EntityRef: save / insert / replace / delete / ...     │   │
//! │  │   Entity: vars + dirty set + persisted + memoized id    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Context (context.rs)                       │   │
//! │  │   reads, recache / uncache, unit-of-work boundary       │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Cache Tiers (cache/)                       │   │
//! │  │   IdentityCache → SharedCache → CacheBackend            │   │
//! │  │   InvalidationQueue → InvalidationTransport             │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Storage Layer (storage/)                   │   │
//! │  │   Query builder + Database trait + MemoryDatabase       │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (RowId, Vars, Error, config)
//! - [`schema`] - Column descriptors and table definitions
//! - [`entity`] - Entities, dirty tracking and the write paths
//! - [`cache`] - Identity map, shared tier and invalidation
//! - [`storage`] - Query builder and database collaborator
//!
//! # Quick Start
//! ```
//! use std::sync::Arc;
//! use rowcache::schema::{Field, Table};
//! use rowcache::storage::MemoryDatabase;
//! use rowcache::{vars, Context, EngineConfig};
//!
//! let memberships = Arc::new(
//!     Table::builder("membership")
//!         .column(Field::new("user").primary())
//!         .column(Field::new("group").primary())
//!         .column(Field::new("role").initial("member"))
//!         .build(),
//! );
//! let db = Arc::new(MemoryDatabase::new());
//! db.create_table(&memberships);
//!
//! let mut ctx = Context::new(db, EngineConfig::default());
//! let row = ctx
//!     .blank(&memberships, &vars! { "user" => "7", "group" => "3" })
//!     .insert(&mut ctx, true)
//!     .unwrap();
//! assert_eq!(row.id().as_str(), "7:3");
//!
//! row.set_var("role", Some("admin".into()));
//! row.save(&mut ctx, true).unwrap();
//! ctx.end_unit_of_work();
//! ```

pub mod cache;
pub mod common;
mod context;
pub mod entity;
pub mod schema;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::{EngineConfig, Error, Result, RowId, Vars};

pub use cache::{CacheBackend, CacheStats, Invalidation, InvalidationTransport, StatsSnapshot};
pub use context::Context;
pub use entity::{Dirty, Entity, EntityRef};
pub use schema::{Column, Table};
pub use storage::{Database, Query};
