//! Built-in column descriptors.
//!
//! - [`Field`] - plain string column
//! - [`AutoIncrement`] - storage-generated primary key
//! - [`CreatedAt`] / [`CreatedBy`] - stamped on blank rows
//! - [`EditedAt`] - stamped before every update
//! - [`DeletedAt`] / [`DeletedBy`] - soft-delete markers
//! - [`Split`] - one value spread over several storage columns

use crate::entity::Entity;
use crate::schema::column::{Capability, Column, HookEnv, StoragePair};
use crate::storage::Query;

/// A plain string column.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    primary: bool,
    is_virtual: bool,
    initial: Option<String>,
    capabilities: Vec<Capability>,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary: false,
            is_virtual: false,
            initial: None,
            capabilities: Vec::new(),
        }
    }

    /// Part of the primary key. Key columns must be declared first.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Never written to storage.
    pub fn virtual_column(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    pub fn initial(mut self, value: impl Into<String>) -> Self {
        self.initial = Some(value.into());
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }
}

impl Column for Field {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_primary(&self) -> bool {
        self.primary
    }

    fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    fn initial(&self) -> Option<&str> {
        self.initial.as_deref()
    }
}

/// Storage-generated integer key.
///
/// Always primary. Blank rows carry NULL so storage picks the value, and
/// `after_create` copies the generated id back onto the entity.
#[derive(Debug, Clone)]
pub struct AutoIncrement {
    name: String,
}

impl AutoIncrement {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Column for AutoIncrement {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_primary(&self) -> bool {
        true
    }

    fn has_capability(&self, capability: Capability) -> bool {
        capability == Capability::AutoIncrement
    }

    fn blank_data(&self, _initial: Option<&str>, _env: &HookEnv) -> Vec<StoragePair> {
        vec![(self.name.clone(), None)]
    }

    fn after_create(&self, entity: &mut Entity, env: &HookEnv) {
        if let Some(id) = env.insert_id() {
            entity.set_var(&self.name, Some(id.to_string()), false);
        }
    }
}

macro_rules! stamp_column {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $ty {
            name: String,
        }

        impl $ty {
            pub fn new(name: impl Into<String>) -> Self {
                Self { name: name.into() }
            }
        }
    };
}

stamp_column!(
    /// Creation time, stamped when a blank row is built.
    CreatedAt
);

impl Column for CreatedAt {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_capability(&self, capability: Capability) -> bool {
        capability == Capability::CreatedAt
    }

    fn blank_data(&self, initial: Option<&str>, env: &HookEnv) -> Vec<StoragePair> {
        let value = initial.map_or_else(|| env.timestamp(), str::to_string);
        vec![(self.name.clone(), Some(value))]
    }
}

stamp_column!(
    /// Creating user, stamped from the acting user when a blank row is built.
    CreatedBy
);

impl Column for CreatedBy {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_capability(&self, capability: Capability) -> bool {
        capability == Capability::CreatedBy
    }

    fn blank_data(&self, initial: Option<&str>, env: &HookEnv) -> Vec<StoragePair> {
        let value = initial.map_or_else(|| env.actor.clone(), str::to_string);
        vec![(self.name.clone(), Some(value))]
    }
}

stamp_column!(
    /// Last edit time, stamped into every UPDATE built for the entity.
    EditedAt
);

impl Column for EditedAt {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_capability(&self, capability: Capability) -> bool {
        capability == Capability::EditedAt
    }

    fn blank_data(&self, _initial: Option<&str>, _env: &HookEnv) -> Vec<StoragePair> {
        vec![(self.name.clone(), None)]
    }

    fn before_update(&self, _entity: &mut Entity, query: &mut Query, env: &HookEnv) {
        query.set(&self.name, Some(env.timestamp()));
    }

    // Only a statement that ran may touch the entity.
    fn after_update(&self, entity: &mut Entity, env: &HookEnv) {
        if env.outcome.is_some() {
            entity.set_var(&self.name, Some(env.timestamp()), false);
        }
    }
}

stamp_column!(
    /// Soft-delete time. NULL while the row is live.
    DeletedAt
);

impl Column for DeletedAt {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_capability(&self, capability: Capability) -> bool {
        capability == Capability::DeletedAt
    }

    fn blank_data(&self, _initial: Option<&str>, _env: &HookEnv) -> Vec<StoragePair> {
        vec![(self.name.clone(), None)]
    }
}

stamp_column!(
    /// Soft-deleting user. NULL while the row is live.
    DeletedBy
);

impl Column for DeletedBy {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_capability(&self, capability: Capability) -> bool {
        capability == Capability::DeletedBy
    }

    fn blank_data(&self, _initial: Option<&str>, _env: &HookEnv) -> Vec<StoragePair> {
        vec![(self.name.clone(), None)]
    }
}

/// One canonical value stored across several columns.
///
/// `Split::new("position", ',', ["lat", "lng"])` stores `"52.5,13.4"` as
/// `lat = "52.5"` and `lng = "13.4"`. Missing parts are stored as NULL.
#[derive(Debug, Clone)]
pub struct Split {
    name: String,
    delimiter: char,
    parts: Vec<String>,
}

impl Split {
    pub fn new<I, S>(name: impl Into<String>, delimiter: char, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            delimiter,
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// Join the storage values back into the canonical value.
    ///
    /// NULL when every part is NULL.
    pub fn canonical(&self, entity: &Entity) -> Option<String> {
        let values: Vec<Option<&str>> = self.parts.iter().map(|p| entity.var(p)).collect();
        if values.iter().all(Option::is_none) {
            return None;
        }
        let joined: Vec<&str> = values.into_iter().map(|v| v.unwrap_or("")).collect();
        Some(joined.join(&self.delimiter.to_string()))
    }
}

impl Column for Split {
    fn name(&self) -> &str {
        &self.name
    }

    fn storage_names(&self) -> Vec<String> {
        self.parts.clone()
    }

    fn to_storage(&self, var: Option<&str>) -> Vec<StoragePair> {
        let mut pieces = var.map(|v| v.split(self.delimiter));
        self.parts
            .iter()
            .map(|part| {
                let value = pieces.as_mut().and_then(Iterator::next).map(str::to_string);
                (part.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_builder() {
        let field = Field::new("title")
            .primary()
            .initial("untitled")
            .capability(Capability::Name);

        assert!(field.is_primary());
        assert!(!field.is_virtual());
        assert_eq!(Column::initial(&field), Some("untitled"));
        assert!(field.has_capability(Capability::Name));
        assert!(!field.has_capability(Capability::CreatedAt));
    }

    #[test]
    fn test_auto_increment_blank_is_null() {
        let col = AutoIncrement::new("id");
        let env = HookEnv::new("1");
        assert_eq!(col.blank_data(Some("7"), &env), vec![("id".to_string(), None)]);
        assert!(col.is_primary());
    }

    #[test]
    fn test_created_by_uses_actor() {
        let col = CreatedBy::new("created_by");
        let env = HookEnv::new("42");
        assert_eq!(
            col.blank_data(None, &env),
            vec![("created_by".to_string(), Some("42".to_string()))]
        );
        assert_eq!(
            col.blank_data(Some("7"), &env),
            vec![("created_by".to_string(), Some("7".to_string()))]
        );
    }

    #[test]
    fn test_split_to_storage() {
        let col = Split::new("position", ',', ["lat", "lng"]);
        assert_eq!(col.storage_names(), vec!["lat", "lng"]);
        assert_eq!(
            col.to_storage(Some("52.5,13.4")),
            vec![
                ("lat".to_string(), Some("52.5".to_string())),
                ("lng".to_string(), Some("13.4".to_string())),
            ]
        );
        assert_eq!(
            col.to_storage(Some("52.5")),
            vec![
                ("lat".to_string(), Some("52.5".to_string())),
                ("lng".to_string(), None),
            ]
        );
        assert_eq!(
            col.to_storage(None),
            vec![("lat".to_string(), None), ("lng".to_string(), None)]
        );
    }
}
