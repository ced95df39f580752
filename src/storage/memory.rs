//! In-memory database.
//!
//! [`MemoryDatabase`] executes [`Query`] values structurally instead of
//! parsing SQL. It honours composite keys, auto-increment columns and
//! MySQL-style REPLACE, keeps a log of rendered statements, and can be told
//! to fail the next write. Several contexts can share one instance through
//! an `Arc` to stand in for processes talking to one database server.

use std::cmp::Ordering;
use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::common::{Error, Result, Vars};
use crate::schema::{Capability, Table};
use crate::storage::{Database, Query, QueryKind, WriteOutcome};

struct MemTable {
    columns: Vec<String>,
    key: Vec<String>,
    auto_increment: Option<String>,
    rows: Vec<Vars>,
    next_id: u64,
}

impl MemTable {
    fn key_of(&self, row: &Vars) -> Vec<Option<String>> {
        self.key
            .iter()
            .map(|k| row.get(k).flatten().map(str::to_string))
            .collect()
    }

    /// Fill in declared columns and the auto-increment value.
    ///
    /// Returns the generated id, if one was assigned.
    fn complete(&mut self, row: &Vars) -> (Vars, Option<u64>) {
        let mut full: Vars = self.columns.iter().map(|c| (c.clone(), None)).collect();
        for (k, v) in row.iter() {
            full.set(k, v.map(str::to_string));
        }

        let mut generated = None;
        if let Some(auto) = &self.auto_increment {
            match full.get(auto).flatten().and_then(|v| v.parse::<u64>().ok()) {
                Some(explicit) if explicit > 0 => {
                    self.next_id = self.next_id.max(explicit + 1);
                    generated = Some(explicit);
                }
                _ => {
                    let id = self.next_id;
                    self.next_id += 1;
                    full.set(auto.clone(), Some(id.to_string()));
                    generated = Some(id);
                }
            }
        }
        (full, generated)
    }
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, MemTable>,
    log: Vec<String>,
    fail_next: Option<String>,
}

/// A thread-safe in-memory [`Database`].
#[derive(Default)]
pub struct MemoryDatabase {
    inner: Mutex<Inner>,
}

fn matches(row: &Vars, conditions: &[(String, Option<String>)]) -> bool {
    conditions
        .iter()
        .all(|(column, value)| row.get(column) == Some(value.as_deref()))
}

fn compare_vars(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match (a.parse::<i64>(), b.parse::<i64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.cmp(b),
        },
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage for a table from its descriptors.
    ///
    /// Re-creating an existing table drops its rows.
    pub fn create_table(&self, table: &Table) {
        let auto_increment = table
            .column_of(Capability::AutoIncrement)
            .map(|c| c.name().to_string());
        let mem = MemTable {
            columns: table.storage_column_names(),
            key: table.primary_key_names().to_vec(),
            auto_increment,
            rows: Vec::new(),
            next_id: 1,
        };
        self.inner.lock().tables.insert(table.name().to_string(), mem);
    }

    /// Make the next write statement fail with `message`.
    pub fn fail_next_write(&self, message: impl Into<String>) {
        self.inner.lock().fail_next = Some(message.into());
    }

    /// Every write statement executed so far, as SQL.
    pub fn statements(&self) -> Vec<String> {
        self.inner.lock().log.clone()
    }

    /// Number of write statements executed so far.
    pub fn write_count(&self) -> usize {
        self.inner.lock().log.len()
    }

    pub fn clear_log(&self) {
        self.inner.lock().log.clear();
    }

    /// Number of rows stored for `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.inner
            .lock()
            .tables
            .get(table)
            .map_or(0, |t| t.rows.len())
    }

    /// Overwrite a stored value behind every cache's back.
    ///
    /// Used to simulate another writer touching the row.
    pub fn poke(&self, table: &str, conditions: &[(&str, &str)], column: &str, value: Option<&str>) {
        let conditions: Vec<(String, Option<String>)> = conditions
            .iter()
            .map(|(k, v)| (k.to_string(), Some(v.to_string())))
            .collect();
        let mut inner = self.inner.lock();
        if let Some(mem) = inner.tables.get_mut(table) {
            for row in mem.rows.iter_mut().filter(|r| matches(r, &conditions)) {
                row.set(column, value.map(str::to_string));
            }
        }
    }

    fn write(mem: &mut MemTable, query: &Query) -> Result<WriteOutcome> {
        match query.kind() {
            QueryKind::Insert => {
                let mut last_id = None;
                let rows = query.rows();
                for row in &rows {
                    let (full, generated) = mem.complete(row);
                    let key = mem.key_of(&full);
                    if mem.rows.iter().any(|r| mem.key_of(r) == key) {
                        return Err(Error::Storage(format!(
                            "duplicate entry {:?} for table key",
                            key
                        )));
                    }
                    mem.rows.push(full);
                    last_id = generated.or(last_id);
                }
                Ok(WriteOutcome::new(rows.len() as u64, last_id))
            }
            QueryKind::Replace => {
                let mut affected = 0;
                let mut last_id = None;
                for row in query.rows() {
                    let (full, generated) = mem.complete(&row);
                    let key = mem.key_of(&full);
                    let before = mem.rows.len();
                    let key_names = mem.key.clone();
                    mem.rows.retain(|r| {
                        key_names
                            .iter()
                            .map(|k| r.get(k).flatten().map(str::to_string))
                            .collect::<Vec<_>>()
                            != key
                    });
                    affected += (before - mem.rows.len()) as u64 + 1;
                    mem.rows.push(full);
                    last_id = generated.or(last_id);
                }
                Ok(WriteOutcome::new(affected, last_id))
            }
            QueryKind::Update => {
                let mut affected = 0;
                for row in mem.rows.iter_mut().filter(|r| matches(r, query.conditions())) {
                    let mut changed = false;
                    for (k, v) in query.set_clause().iter() {
                        changed |= row.set(k, v.map(str::to_string));
                    }
                    if changed {
                        affected += 1;
                    }
                }
                Ok(WriteOutcome::new(affected, None))
            }
            QueryKind::Delete => {
                let before = mem.rows.len();
                mem.rows.retain(|r| !matches(r, query.conditions()));
                Ok(WriteOutcome::new((before - mem.rows.len()) as u64, None))
            }
            QueryKind::Select => Err(Error::Storage(
                "SELECT passed to execute; use fetch".to_string(),
            )),
        }
    }
}

impl Database for MemoryDatabase {
    fn execute(&self, query: &Query) -> Result<WriteOutcome> {
        let mut inner = self.inner.lock();
        if let Some(message) = inner.fail_next.take() {
            return Err(Error::Storage(message));
        }

        let sql = query.to_sql();
        debug!(%sql, "execute");
        let Inner { tables, log, .. } = &mut *inner;
        let mem = tables
            .get_mut(query.table())
            .ok_or_else(|| Error::Storage(format!("table {} doesn't exist", query.table())))?;
        let outcome = Self::write(mem, query)?;
        log.push(sql);
        Ok(outcome)
    }

    fn fetch(&self, query: &Query) -> Result<Vec<Vars>> {
        let inner = self.inner.lock();
        let mem = inner
            .tables
            .get(query.table())
            .ok_or_else(|| Error::Storage(format!("table {} doesn't exist", query.table())))?;

        let mut rows: Vec<Vars> = mem
            .rows
            .iter()
            .filter(|r| matches(r, query.conditions()))
            .cloned()
            .collect();
        if let Some(order) = query.order() {
            rows.sort_by(|a, b| compare_vars(a.get(order).flatten(), b.get(order).flatten()));
        }
        if let Some(limit) = query.limit_value() {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}
