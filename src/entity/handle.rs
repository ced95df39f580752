//! Shared entity handle and the write paths.
//!
//! Every write follows the same shape: build the statement, run the before
//! hooks, execute, and only after storage accepted it flip the in-memory
//! state (dirty cleared, persisted set), run the after hooks and notify the
//! context so caches and the invalidation outbox stay in step. A storage
//! error returns before any of that, leaving the entity as it was.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::common::{Error, Result, RowId, Vars};
use crate::context::Context;
use crate::entity::lifecycle::{self, Event};
use crate::entity::Entity;
use crate::schema::{Capability, Table};
use crate::storage::Query;

/// Handle to an entity shared by the identity map and callers.
///
/// Two handles obtained for the same id from one [`Context`] point at the
/// same entity; [`ptr_eq`](Self::ptr_eq) tells them apart from copies.
#[derive(Debug, Clone)]
pub struct EntityRef(Rc<RefCell<Entity>>);

impl EntityRef {
    pub fn new(entity: Entity) -> Self {
        Self(Rc::new(RefCell::new(entity)))
    }

    /// Whether both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn borrow(&self) -> Ref<'_, Entity> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Entity> {
        self.0.borrow_mut()
    }

    // ========================================================================
    // Shorthands
    // ========================================================================

    pub fn table(&self) -> Arc<Table> {
        Arc::clone(self.borrow().table())
    }

    pub fn id(&self) -> RowId {
        self.borrow().id().clone()
    }

    pub fn var(&self, key: &str) -> Option<String> {
        self.borrow().var(key).map(str::to_string)
    }

    pub fn set_var(&self, key: &str, value: Option<String>) -> bool {
        self.borrow_mut().set_var(key, value, true)
    }

    pub fn is_dirty(&self) -> bool {
        self.borrow().is_dirty()
    }

    pub fn is_persisted(&self) -> bool {
        self.borrow().is_persisted()
    }

    pub fn is_deleted(&self) -> bool {
        self.borrow().is_deleted()
    }

    pub fn dirty_vars(&self) -> Vars {
        self.borrow().dirty_vars()
    }

    pub fn column_var_of(&self, capability: Capability) -> Option<String> {
        self.borrow().column_var_of(capability).map(str::to_string)
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Write the dirty columns.
    ///
    /// Unpersisted entities are inserted. Persisted ones get an UPDATE of
    /// the dirty columns; with nothing dirty no statement is issued. Returns
    /// the identity-mapped instance, which is `self` unless another handle
    /// for the same id was already cached.
    pub fn save(&self, ctx: &mut Context, with_hooks: bool) -> Result<EntityRef> {
        if !self.is_persisted() {
            return self.insert(ctx, with_hooks);
        }

        {
            let mut entity = self.borrow_mut();
            let table = Arc::clone(entity.table());
            ensure_row(&entity)?;

            let set = entity.dirty_vars();
            if set.is_empty() {
                debug!(table = table.name(), id = %entity.id(), "save: nothing dirty");
                return Ok(self.clone());
            }

            let env = ctx.hook_env();
            let mut query = Query::update(table.name());
            for (column, value) in set {
                query.set(&column, value);
            }
            entity.where_primary(&mut query);

            if with_hooks {
                lifecycle::before(&mut entity, Event::Update, &mut query, &env);
            }
            let outcome = ctx.execute(&query)?;
            entity.mark_all_clean();

            if with_hooks {
                lifecycle::after(&mut entity, Event::Update, &env.with_outcome(outcome));
            }
        }

        Ok(ctx.recache(self))
    }

    /// INSERT every non-virtual column.
    pub fn insert(&self, ctx: &mut Context, with_hooks: bool) -> Result<EntityRef> {
        let query = {
            let entity = self.borrow();
            ensure_row(&entity)?;
            let mut query = Query::insert(entity.table().name());
            query.values(entity.storage_vars());
            query
        };
        self.create(ctx, query, with_hooks)
    }

    /// REPLACE every non-virtual column.
    ///
    /// REPLACE needs a key to target; an empty or all-zero id falls back to
    /// [`insert`](Self::insert).
    pub fn replace(&self, ctx: &mut Context, with_hooks: bool) -> Result<EntityRef> {
        let query = {
            let entity = self.borrow();
            ensure_row(&entity)?;
            if entity.id().is_degenerate() {
                debug!(table = entity.table().name(), id = %entity.id(), "replace: degenerate id, inserting");
                drop(entity);
                return self.insert(ctx, with_hooks);
            }
            let mut query = Query::replace(entity.table().name());
            for key in entity.table().primary_key_names() {
                query.value(key, entity.var(key).map(str::to_string));
            }
            query.values(entity.storage_vars());
            query
        };
        self.create(ctx, query, with_hooks)
    }

    fn create(&self, ctx: &mut Context, mut query: Query, with_hooks: bool) -> Result<EntityRef> {
        let table = {
            let mut entity = self.borrow_mut();
            let env = ctx.hook_env();
            if with_hooks {
                lifecycle::before(&mut entity, Event::Create, &mut query, &env);
            }
            let outcome = ctx.execute(&query)?;
            entity.mark_all_clean();
            entity.set_persisted(true);

            let env = env.with_outcome(outcome);
            if with_hooks {
                lifecycle::after(&mut entity, Event::Create, &env);
            } else {
                lifecycle::capture_insert_id(&mut entity, &env);
            }
            Arc::clone(entity.table())
        };

        ctx.uncache_all(&table);
        Ok(ctx.recache(self))
    }

    // ========================================================================
    // Update
    // ========================================================================

    /// Write `vars` straight to storage.
    ///
    /// Only values that differ from the entity's are written. Returns the
    /// "worthy" flag: true when something changed and a statement ran. The
    /// update hooks fire either way.
    ///
    /// # Errors
    /// - [`Error::UnpersistedWrite`] on an unpersisted entity
    /// - [`Error::UnknownColumn`] for a key that is neither a column nor a
    ///   stored value
    pub fn save_vars(&self, ctx: &mut Context, vars: &Vars, with_hooks: bool) -> Result<bool> {
        let worthy = {
            let mut entity = self.borrow_mut();
            let table = Arc::clone(entity.table());
            if !entity.is_persisted() {
                return Err(Error::UnpersistedWrite {
                    table: table.name().to_string(),
                });
            }
            ensure_row(&entity)?;

            let mut changes = Vec::new();
            for (key, var) in vars.iter() {
                let pairs = match table.find_column(key) {
                    Some(column) => column.to_storage(var),
                    None if entity.has_var(key) => vec![(key.to_string(), var.map(str::to_string))],
                    None => return Err(Error::unknown_column(table.name(), key)),
                };
                for (name, value) in pairs {
                    if entity.vars().get(&name) != Some(value.as_deref()) {
                        changes.push((key.to_string(), name, value));
                    }
                }
            }

            let env = ctx.hook_env();
            let mut query = Query::update(table.name());
            for (_, name, value) in &changes {
                query.set(name, value.clone());
            }
            entity.where_primary(&mut query);

            if with_hooks {
                lifecycle::before(&mut entity, Event::Update, &mut query, &env);
            }

            let worthy = !changes.is_empty();
            let env = if worthy {
                let outcome = ctx.execute(&query)?;
                for (key, name, value) in changes {
                    entity.store_raw(&name, value);
                    entity.mark_clean(&key);
                }
                env.with_outcome(outcome)
            } else {
                debug!(table = table.name(), id = %entity.id(), "save_vars: nothing changed");
                env
            };

            if with_hooks {
                lifecycle::after(&mut entity, Event::Update, &env);
            }
            worthy
        };

        if worthy {
            ctx.recache(self);
        }
        Ok(worthy)
    }

    /// [`save_vars`](Self::save_vars) for one key.
    pub fn save_var(
        &self,
        ctx: &mut Context,
        key: &str,
        var: Option<&str>,
        with_hooks: bool,
    ) -> Result<bool> {
        let mut vars = Vars::new();
        vars.set(key, var.map(str::to_string));
        self.save_vars(ctx, &vars, with_hooks)
    }

    /// Save a value through its column's storage mapping.
    ///
    /// Unlike [`save_var`](Self::save_var) the key must name a column.
    pub fn save_value(&self, ctx: &mut Context, key: &str, value: Option<&str>) -> Result<bool> {
        let table = self.table();
        table.column(key)?;
        self.save_var(ctx, key, value, true)
    }

    /// Add `by` to a numeric column. A null value counts as zero.
    pub fn increase(&self, ctx: &mut Context, key: &str, by: i64) -> Result<bool> {
        if by == 0 {
            return Ok(false);
        }
        let current = self.var(key);
        let base = match current.as_deref() {
            None => 0,
            Some(v) => v.trim().parse::<i64>().map_err(|_| Error::NotNumeric {
                column: key.to_string(),
                value: current.clone(),
            })?,
        };
        let next = base
            .checked_add(by)
            .ok_or_else(|| Error::NotNumeric {
                column: key.to_string(),
                value: current.clone(),
            })?
            .to_string();
        self.save_var(ctx, key, Some(&next), true)
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Physical DELETE by primary key. A no-op on unpersisted entities.
    pub fn delete(&self, ctx: &mut Context, with_hooks: bool) -> Result<()> {
        let (table, id) = {
            let mut entity = self.borrow_mut();
            if !entity.is_persisted() {
                return Ok(());
            }
            let table = Arc::clone(entity.table());
            let env = ctx.hook_env();
            let mut query = Query::delete(table.name());
            entity.where_primary(&mut query);

            if with_hooks {
                lifecycle::before(&mut entity, Event::Delete, &mut query, &env);
            }
            let outcome = ctx.execute(&query)?;
            entity.set_persisted(false);

            if with_hooks {
                lifecycle::after(&mut entity, Event::Delete, &env.with_outcome(outcome));
            }
            let id = entity.id().clone();
            (table, id)
        };

        // A detached handle may stand in for the tracked instance.
        if let Some(tracked) = ctx.cached(&table, &id) {
            if !tracked.ptr_eq(self) {
                tracked.borrow_mut().set_persisted(false);
            }
        }
        ctx.uncache(self);
        ctx.uncache_all(&table);
        Ok(())
    }

    /// Soft delete through the deleted-at / deleted-by columns.
    ///
    /// Tables with neither column get a physical [`delete`](Self::delete).
    /// Otherwise the columns are stamped and saved and the row stays
    /// persisted; the delete hooks still fire afterwards.
    pub fn mark_deleted(&self, ctx: &mut Context, with_hooks: bool) -> Result<EntityRef> {
        let table = self.table();
        let at = table.column_of(Capability::DeletedAt);
        let by = table.column_of(Capability::DeletedBy);
        if at.is_none() && by.is_none() {
            self.delete(ctx, with_hooks)?;
            return Ok(self.clone());
        }
        if !self.is_persisted() {
            return Err(Error::UnpersistedWrite {
                table: table.name().to_string(),
            });
        }

        let env = ctx.hook_env();
        {
            let mut entity = self.borrow_mut();
            if let Some(column) = at {
                entity.set_var(column.name(), Some(env.timestamp()), true);
            }
            if let Some(column) = by {
                entity.set_var(column.name(), Some(env.actor.clone()), true);
            }
        }

        let saved = self.save(ctx, with_hooks)?;
        if with_hooks {
            lifecycle::after(&mut saved.borrow_mut(), Event::Delete, &env);
        }
        Ok(saved)
    }
}

fn ensure_row(entity: &Entity) -> Result<()> {
    if entity.vars().is_empty() {
        return Err(Error::EmptyRow {
            table: entity.table().name().to_string(),
        });
    }
    Ok(())
}
