//! Ordered column-name to value mapping.

use serde::{Deserialize, Serialize};

/// The string-or-null values of one row, in column order.
///
/// Every persisted value is a canonical string; richer types live in the
/// column descriptors. Rows are small, so lookup is a linear scan that keeps
/// insertion order for free.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vars(Vec<(String, Option<String>)>);

impl Vars {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Value of `key`. `None` if absent, `Some(None)` if present and null.
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_deref())
    }

    /// Whether `key` is present (null or not).
    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Insert or overwrite `key`, keeping its original position.
    ///
    /// Returns true if the stored value changed.
    pub fn set(&mut self, key: impl Into<String>, value: Option<String>) -> bool {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, old)) if *old == value => false,
            Some((_, old)) => {
                *old = value;
                true
            }
            None => {
                self.0.push((key, value));
                true
            }
        }
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Option<String>> {
        let pos = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(pos).1)
    }

    /// Iterate pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Column names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for Vars {
    fn from_iter<T: IntoIterator<Item = (K, Option<String>)>>(iter: T) -> Self {
        let mut vars = Vars::new();
        for (k, v) in iter {
            vars.set(k, v);
        }
        vars
    }
}

impl IntoIterator for Vars {
    type Item = (String, Option<String>);
    type IntoIter = std::vec::IntoIter<(String, Option<String>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Build [`Vars`] from string literals; `None` stands for SQL NULL.
///
/// ```
/// use rowcache::vars;
///
/// let row = vars! { "id" => "1", "name" => "a", "note" => None };
/// assert_eq!(row.get("note"), Some(None));
/// ```
#[macro_export]
macro_rules! vars {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut vars = $crate::Vars::new();
        $( vars.set($key, $crate::common::vars::IntoVar::into_var($value)); )*
        vars
    }};
}

/// Conversion used by the [`vars!`] macro.
pub trait IntoVar {
    fn into_var(self) -> Option<String>;
}

impl IntoVar for &str {
    fn into_var(self) -> Option<String> {
        Some(self.to_string())
    }
}

impl IntoVar for String {
    fn into_var(self) -> Option<String> {
        Some(self)
    }
}

impl IntoVar for Option<String> {
    fn into_var(self) -> Option<String> {
        self
    }
}
