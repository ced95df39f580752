//! Column descriptor contract.
//!
//! A [`Column`] owns everything type-specific about one field: which storage
//! columns it maps to, how a canonical value expands into them, what a blank
//! row starts with, and what it does around each write. The entity layer
//! itself only ever sees strings.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::entity::Entity;
use crate::storage::{Query, WriteOutcome};

/// Tags used to locate a column by role rather than by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    AutoIncrement,
    CreatedAt,
    CreatedBy,
    EditedAt,
    DeletedAt,
    DeletedBy,
    Name,
}

/// Ambient values handed to hooks and blank-row construction.
#[derive(Debug, Clone)]
pub struct HookEnv {
    /// Id of the acting user.
    pub actor: String,
    /// Wall clock at the start of the operation.
    pub now: DateTime<Utc>,
    /// Outcome of the statement, for after-hooks of writes.
    pub outcome: Option<WriteOutcome>,
}

impl HookEnv {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            now: Utc::now(),
            outcome: None,
        }
    }

    pub(crate) fn with_outcome(mut self, outcome: WriteOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Generated auto-increment value of the last statement.
    pub fn insert_id(&self) -> Option<u64> {
        self.outcome.and_then(|o| o.insert_id())
    }

    /// `now` in the canonical storage format.
    pub fn timestamp(&self) -> String {
        format_timestamp(self.now)
    }
}

/// Canonical storage format for date-time columns.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Storage column name paired with its string-or-null value.
pub type StoragePair = (String, Option<String>);

/// A column descriptor.
///
/// Every hook has a no-op default so descriptors only implement the events
/// they care about. Hooks run for every column of a table before the
/// table's own [`EntityHooks`](crate::schema::EntityHooks).
pub trait Column: fmt::Debug + Send + Sync {
    /// Name of the column as seen by callers.
    fn name(&self) -> &str;

    fn is_primary(&self) -> bool {
        false
    }

    /// Virtual columns are never written to storage.
    fn is_virtual(&self) -> bool {
        false
    }

    fn has_capability(&self, _capability: Capability) -> bool {
        false
    }

    /// Value a blank row starts with.
    fn initial(&self) -> Option<&str> {
        None
    }

    /// Storage columns this descriptor owns, in order.
    fn storage_names(&self) -> Vec<String> {
        vec![self.name().to_string()]
    }

    /// Expand a canonical value into storage values.
    fn to_storage(&self, var: Option<&str>) -> Vec<StoragePair> {
        vec![(self.name().to_string(), var.map(str::to_string))]
    }

    /// Read this column's storage values off an entity.
    fn storage_data(&self, entity: &Entity) -> Vec<StoragePair> {
        self.storage_names()
            .into_iter()
            .map(|name| {
                let value = entity.var(&name).map(str::to_string);
                (name, value)
            })
            .collect()
    }

    /// Storage values for a blank row.
    fn blank_data(&self, initial: Option<&str>, _env: &HookEnv) -> Vec<StoragePair> {
        self.to_storage(initial.or(self.initial()))
    }

    fn before_create(&self, _entity: &mut Entity, _query: &mut Query, _env: &HookEnv) {}
    fn before_read(&self, _query: &mut Query) {}
    fn before_update(&self, _entity: &mut Entity, _query: &mut Query, _env: &HookEnv) {}
    fn before_delete(&self, _entity: &mut Entity, _query: &mut Query, _env: &HookEnv) {}

    fn after_create(&self, _entity: &mut Entity, _env: &HookEnv) {}
    fn after_read(&self, _entity: &mut Entity, _env: &HookEnv) {}
    fn after_update(&self, _entity: &mut Entity, _env: &HookEnv) {}
    fn after_delete(&self, _entity: &mut Entity, _env: &HookEnv) {}
}
