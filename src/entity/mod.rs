//! Entity layer - one materialized row and its write paths.
//!
//! # Components
//! - [`Entity`] - values, dirty set, persisted flag, memoized id
//! - [`EntityRef`] - the shared handle the identity map hands out, carrying
//!   the CRUD operations

mod handle;
pub(crate) mod lifecycle;
mod state;

pub use handle::EntityRef;
pub use state::{Dirty, Entity};
