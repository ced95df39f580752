//! Per-table identity map.

use std::collections::HashMap;
use std::sync::Arc;

use crate::common::RowId;
use crate::entity::EntityRef;
use crate::schema::Table;

/// Process-local map from row id to the one live instance of that row.
///
/// # Architecture
/// ```text
/// ┌───────────────────────────────────────────────┐
/// │ IdentityCache (one per table, per Context)    │
/// │  ┌─────────────────┐   ┌───────────────────┐  │
/// │  │ entries         │   │ all               │  │
/// │  │ RowId → Entity  │   │ Option<Vec<Ref>>  │  │
/// │  └─────────────────┘   └───────────────────┘  │
/// └───────────────────────────────────────────────┘
/// ```
///
/// The map never replaces a cached handle. [`insert`](Self::insert) copies
/// the incoming values into the existing instance and hands that back, so
/// every caller holding the old handle sees the update.
#[derive(Debug)]
pub struct IdentityCache {
    table: Arc<Table>,
    entries: HashMap<RowId, EntityRef>,
    all: Option<Vec<EntityRef>>,
}

impl IdentityCache {
    pub fn new(table: Arc<Table>) -> Self {
        Self {
            table,
            entries: HashMap::new(),
            all: None,
        }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn get(&self, id: &RowId) -> Option<EntityRef> {
        self.entries.get(id).cloned()
    }

    pub fn has_id(&self, id: &RowId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Track `entity`, or fold it into the instance already tracked.
    ///
    /// Returns the canonical handle for the entity's id.
    pub fn insert(&mut self, entity: EntityRef) -> EntityRef {
        let id = entity.id();
        match self.entries.get(&id) {
            Some(existing) if existing.ptr_eq(&entity) => entity,
            Some(existing) => {
                let vars = entity.borrow().vars().clone();
                let mut target = existing.borrow_mut();
                target.replace_vars(vars);
                target.set_persisted(true);
                drop(target);
                existing.clone()
            }
            None => {
                self.entries.insert(id, entity.clone());
                entity
            }
        }
    }

    pub fn remove(&mut self, id: &RowId) -> Option<EntityRef> {
        self.entries.remove(id)
    }

    /// Drop every entry and the all-rows list.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.all = None;
    }

    pub fn all_rows(&self) -> Option<&[EntityRef]> {
        self.all.as_deref()
    }

    pub fn set_all_rows(&mut self, rows: Vec<EntityRef>) {
        self.all = Some(rows);
    }

    pub fn clear_all_rows(&mut self) {
        self.all = None;
    }
}
