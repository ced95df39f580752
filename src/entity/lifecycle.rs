//! Hook dispatch: every column descriptor first, then the table hooks.

use std::sync::Arc;

use crate::entity::Entity;
use crate::schema::{Capability, HookEnv, Table};
use crate::storage::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Create,
    Update,
    Delete,
}

pub(crate) fn before(entity: &mut Entity, event: Event, query: &mut Query, env: &HookEnv) {
    let table = Arc::clone(entity.table());
    for column in table.columns() {
        match event {
            Event::Create => column.before_create(entity, query, env),
            Event::Update => column.before_update(entity, query, env),
            Event::Delete => column.before_delete(entity, query, env),
        }
    }
    let hooks = table.hooks();
    match event {
        Event::Create => hooks.before_create(entity, query),
        Event::Update => hooks.before_update(entity, query),
        Event::Delete => hooks.before_delete(entity, query),
    }
}

pub(crate) fn after(entity: &mut Entity, event: Event, env: &HookEnv) {
    let table = Arc::clone(entity.table());
    for column in table.columns() {
        match event {
            Event::Create => column.after_create(entity, env),
            Event::Update => column.after_update(entity, env),
            Event::Delete => column.after_delete(entity, env),
        }
    }
    let hooks = table.hooks();
    match event {
        Event::Create => hooks.after_create(entity),
        Event::Update => hooks.after_update(entity),
        Event::Delete => hooks.after_delete(entity),
    }
}

pub(crate) fn before_read(table: &Table, query: &mut Query) {
    for column in table.columns() {
        column.before_read(query);
    }
    table.hooks().before_read(query);
}

pub(crate) fn after_read(entity: &mut Entity, env: &HookEnv) {
    let table = Arc::clone(entity.table());
    for column in table.columns() {
        column.after_read(entity, env);
    }
    table.hooks().after_read(entity);
}

/// Copy the generated key onto the entity when hooks are skipped.
pub(crate) fn capture_insert_id(entity: &mut Entity, env: &HookEnv) {
    let table = Arc::clone(entity.table());
    if let Some(column) = table.column_of(Capability::AutoIncrement) {
        column.after_create(entity, env);
    }
}
