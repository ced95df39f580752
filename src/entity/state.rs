//! In-memory row state: values, dirty set, persisted flag and memoized id.

use std::cell::OnceCell;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::common::{RowId, Vars};
use crate::schema::{Capability, HookEnv, Table};
use crate::storage::Query;

/// Which columns changed since the last clean state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Dirty {
    /// Nothing to write.
    #[default]
    None,
    /// Every column, as for a blank row.
    All,
    /// The named columns. Never empty; an empty set collapses to `None`.
    Fields(BTreeSet<String>),
}

/// One materialized row.
///
/// # Invariants
/// - `persisted == true` means storage holds exactly `vars`
/// - `dirty` is cleared after every successful write and never on failure
/// - the memoized id is dropped whenever a key value, the whole row, or the
///   persisted flag changes
#[derive(Debug)]
pub struct Entity {
    table: Arc<Table>,
    vars: Vars,
    dirty: Dirty,
    persisted: bool,
    id: OnceCell<RowId>,
}

impl Entity {
    /// A new unpersisted row with every column at its blank value.
    pub fn blank(table: Arc<Table>, initial: &Vars, env: &HookEnv) -> Self {
        let vars = table.blank_data(initial, env);
        Self {
            table,
            vars,
            dirty: Dirty::All,
            persisted: false,
            id: OnceCell::new(),
        }
    }

    /// A persisted, clean row straight from storage.
    pub fn hydrate(table: Arc<Table>, row: Vars) -> Self {
        Self {
            table,
            vars: row,
            dirty: Dirty::None,
            persisted: true,
            id: OnceCell::new(),
        }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Value of `key`, `None` when absent or null.
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).flatten()
    }

    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    pub fn has_var(&self, key: &str) -> bool {
        self.vars.contains(key)
    }

    /// Store a value.
    ///
    /// Column keys go through the column's storage mapping, which may expand
    /// into several storage columns. With `mark_dirty`, the column joins the
    /// dirty set if any storage value actually changed. Other keys are
    /// stored raw and never marked.
    ///
    /// Returns true if any stored value changed.
    pub fn set_var(&mut self, key: &str, value: Option<String>, mark_dirty: bool) -> bool {
        let table = Arc::clone(&self.table);
        let column = table.find_column(key);
        let pairs = match column {
            Some(column) => column.to_storage(value.as_deref()),
            None => vec![(key.to_string(), value)],
        };

        let mut changed = false;
        for (name, value) in pairs {
            let is_key = table.primary_key_names().contains(&name);
            if self.vars.set(name, value) {
                changed = true;
                if is_key {
                    self.id.take();
                }
            }
        }

        if changed && mark_dirty && column.is_some() {
            self.mark_dirty(key);
        }
        changed
    }

    /// [`set_var`](Self::set_var) over several pairs.
    pub fn set_vars<I, K>(&mut self, vars: I, mark_dirty: bool) -> bool
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: AsRef<str>,
    {
        let mut changed = false;
        for (key, value) in vars {
            changed |= self.set_var(key.as_ref(), value, mark_dirty);
        }
        changed
    }

    /// Replace the whole row and mark it clean.
    pub fn replace_vars(&mut self, vars: Vars) {
        self.vars = vars;
        self.dirty = Dirty::None;
        self.id.take();
    }

    /// Write a storage value without routing or dirty marking.
    pub(crate) fn store_raw(&mut self, key: &str, value: Option<String>) {
        if self.vars.set(key, value) && self.table.primary_key_names().iter().any(|k| k == key) {
            self.id.take();
        }
    }

    // ========================================================================
    // Dirty tracking
    // ========================================================================

    pub fn dirty(&self) -> &Dirty {
        &self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty != Dirty::None
    }

    pub fn mark_dirty(&mut self, key: &str) {
        match &mut self.dirty {
            Dirty::All => {}
            Dirty::Fields(fields) => {
                fields.insert(key.to_string());
            }
            Dirty::None => {
                self.dirty = Dirty::Fields(BTreeSet::from([key.to_string()]));
            }
        }
    }

    /// Drop `key` from the dirty set. `All` narrows to every other column.
    pub fn mark_clean(&mut self, key: &str) {
        let remaining = match &self.dirty {
            Dirty::None => return,
            Dirty::All => self
                .table
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .filter(|name| name != key)
                .collect(),
            Dirty::Fields(fields) => {
                let mut fields = fields.clone();
                fields.remove(key);
                fields
            }
        };
        self.dirty = if remaining.is_empty() {
            Dirty::None
        } else {
            Dirty::Fields(remaining)
        };
    }

    pub fn mark_all_clean(&mut self) {
        self.dirty = Dirty::None;
    }

    /// Storage pairs implied by the dirty set, in column order.
    pub fn dirty_vars(&self) -> Vars {
        let table = &self.table;
        let mut out = Vars::new();
        for column in table.columns().iter().filter(|c| !c.is_virtual()) {
            let dirty = match &self.dirty {
                Dirty::None => false,
                Dirty::All => true,
                Dirty::Fields(fields) => fields.contains(column.name()),
            };
            if dirty {
                for (name, value) in column.storage_data(self) {
                    out.set(name, value);
                }
            }
        }
        out
    }

    /// Storage pairs of every non-virtual column.
    pub fn storage_vars(&self) -> Vars {
        self.table
            .columns()
            .iter()
            .filter(|c| !c.is_virtual())
            .flat_map(|c| c.storage_data(self))
            .collect()
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Primary key values joined in declared order.
    pub fn id(&self) -> &RowId {
        self.id.get_or_init(|| {
            RowId::from_parts(
                self.table
                    .primary_key_names()
                    .iter()
                    .map(|k| self.var(k).unwrap_or("")),
            )
        })
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub(crate) fn set_persisted(&mut self, persisted: bool) {
        if self.persisted != persisted {
            self.persisted = persisted;
            self.id.take();
        }
    }

    /// AND one equality condition per primary key column onto `query`.
    pub fn where_primary(&self, query: &mut Query) {
        for key in self.table.primary_key_names() {
            query.where_eq(key, self.var(key).map(str::to_string));
        }
    }

    /// Value of the first column tagged with `capability`.
    pub fn column_var_of(&self, capability: Capability) -> Option<&str> {
        let column = self.table.column_of(capability)?;
        self.var(column.name())
    }

    /// Soft-deleted when a deleted-at or deleted-by column is set; tables
    /// without either count physically deleted rows as deleted.
    pub fn is_deleted(&self) -> bool {
        let at = self.table.column_of(Capability::DeletedAt);
        let by = self.table.column_of(Capability::DeletedBy);
        if at.is_none() && by.is_none() {
            return !self.persisted;
        }
        [at, by]
            .into_iter()
            .flatten()
            .any(|c| self.var(c.name()).is_some())
    }
}

impl Table {
    /// A blank entity of this table.
    pub fn blank(self: &Arc<Self>, initial: &Vars, env: &HookEnv) -> Entity {
        Entity::blank(Arc::clone(self), initial, env)
    }
}
