//! Entity-level lifecycle hooks.

use crate::entity::Entity;
use crate::storage::Query;

/// Hooks that run once per operation on the entity itself, after every
/// column descriptor's hook of the same event.
pub trait EntityHooks: Send + Sync {
    fn before_create(&self, _entity: &mut Entity, _query: &mut Query) {}
    fn before_read(&self, _query: &mut Query) {}
    fn before_update(&self, _entity: &mut Entity, _query: &mut Query) {}
    fn before_delete(&self, _entity: &mut Entity, _query: &mut Query) {}

    fn after_create(&self, _entity: &mut Entity) {}
    fn after_read(&self, _entity: &mut Entity) {}
    fn after_update(&self, _entity: &mut Entity) {}
    fn after_delete(&self, _entity: &mut Entity) {}
}

/// The default: no entity-level behaviour.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl EntityHooks for NoHooks {}
