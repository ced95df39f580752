//! Table definitions and primary key introspection.

use std::fmt;
use std::sync::OnceLock;

use crate::common::{Error, Result, RowId, Vars};
use crate::schema::column::{Capability, Column, HookEnv};
use crate::schema::hooks::{EntityHooks, NoHooks};

/// Schema of one entity type.
///
/// Tables are immutable once built and shared between contexts behind an
/// `Arc`. The primary key is resolved lazily and memoized.
///
/// # Primary keys
/// Key columns are declared first. The key is the first contiguous run of
/// primary columns; a table with none is keyed on every column.
pub struct Table {
    name: String,
    columns: Vec<Box<dyn Column>>,
    cached: bool,
    shared_cached: bool,
    hooks: Box<dyn EntityHooks>,
    primary_key: OnceLock<Vec<usize>>,
    primary_names: OnceLock<Vec<String>>,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .field("cached", &self.cached)
            .field("shared_cached", &self.shared_cached)
            .finish()
    }
}

/// Builder for [`Table`].
pub struct TableBuilder {
    name: String,
    columns: Vec<Box<dyn Column>>,
    cached: bool,
    shared_cached: bool,
    hooks: Box<dyn EntityHooks>,
}

impl TableBuilder {
    /// Append a column. Order matters: key columns go first.
    pub fn column(mut self, column: impl Column + 'static) -> Self {
        self.columns.push(Box::new(column));
        self
    }

    /// Opt out of the process identity map (and therefore the shared tier).
    pub fn uncached(mut self) -> Self {
        self.cached = false;
        self.shared_cached = false;
        self
    }

    /// Whether single rows go to the shared tier. Defaults to on.
    pub fn shared_cached(mut self, enabled: bool) -> Self {
        self.shared_cached = enabled && self.cached;
        self
    }

    pub fn hooks(mut self, hooks: impl EntityHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn build(self) -> Table {
        Table {
            name: self.name,
            columns: self.columns,
            cached: self.cached,
            shared_cached: self.shared_cached,
            hooks: self.hooks,
            primary_key: OnceLock::new(),
            primary_names: OnceLock::new(),
        }
    }
}

impl Table {
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder {
            name: name.into(),
            columns: Vec::new(),
            cached: true,
            shared_cached: true,
            hooks: Box::new(NoHooks),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Box<dyn Column>] {
        &self.columns
    }

    /// Whether the table uses the process identity map.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// Whether single rows are mirrored into the shared tier.
    pub fn is_shared_cached(&self) -> bool {
        self.shared_cached
    }

    pub fn hooks(&self) -> &dyn EntityHooks {
        self.hooks.as_ref()
    }

    /// Look up a column by name.
    pub fn find_column(&self, name: &str) -> Option<&dyn Column> {
        self.columns
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    /// Look up a column by name, failing with [`Error::UnknownColumn`].
    pub fn column(&self, name: &str) -> Result<&dyn Column> {
        self.find_column(name)
            .ok_or_else(|| Error::unknown_column(&self.name, name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.find_column(name).is_some()
    }

    /// First column carrying `capability`.
    pub fn column_of(&self, capability: Capability) -> Option<&dyn Column> {
        self.columns
            .iter()
            .find(|c| c.has_capability(capability))
            .map(|c| c.as_ref())
    }

    fn primary_key_indices(&self) -> &[usize] {
        self.primary_key.get_or_init(|| {
            let run: Vec<usize> = self
                .columns
                .iter()
                .take_while(|c| c.is_primary())
                .enumerate()
                .map(|(i, _)| i)
                .collect();
            if run.is_empty() {
                (0..self.columns.len()).collect()
            } else {
                run
            }
        })
    }

    /// The primary key columns in declared order.
    pub fn primary_key_columns(&self) -> Vec<&dyn Column> {
        self.primary_key_indices()
            .iter()
            .map(|&i| self.columns[i].as_ref())
            .collect()
    }

    /// Names of the primary key columns in declared order.
    pub fn primary_key_names(&self) -> &[String] {
        self.primary_names.get_or_init(|| {
            self.primary_key_columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect()
        })
    }

    /// Every storage column, in declared order, skipping virtual columns.
    pub fn storage_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !c.is_virtual())
            .flat_map(|c| c.storage_names())
            .collect()
    }

    pub fn has_storage_column(&self, name: &str) -> bool {
        self.columns
            .iter()
            .filter(|c| !c.is_virtual())
            .any(|c| c.storage_names().iter().any(|n| n == name))
    }

    /// Id of a storage row. Missing or null key values become empty parts.
    pub fn id_of(&self, row: &Vars) -> RowId {
        RowId::from_parts(
            self.primary_key_names()
                .iter()
                .map(|k| row.get(k).flatten().unwrap_or("")),
        )
    }

    /// Storage values for a new row.
    ///
    /// Each column contributes its blank data; a storage column named in
    /// `initial` takes the initial value instead.
    pub fn blank_data(&self, initial: &Vars, env: &HookEnv) -> Vars {
        let mut vars = Vars::new();
        for column in &self.columns {
            let seed = initial.get(column.name()).flatten();
            for (key, value) in column.blank_data(seed, env) {
                let value = match initial.get(&key) {
                    Some(v) => v.map(str::to_string),
                    None => value,
                };
                vars.set(key, value);
            }
        }
        vars
    }
}
