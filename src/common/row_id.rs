//! Composite row identifier type.

use std::fmt;

use crate::common::config::ID_SEPARATOR;

/// Identifies a row within one table.
///
/// The id is the row's primary key values joined by [`ID_SEPARATOR`] in
/// declared key order. Null key values contribute an empty part.
///
/// # Example
/// ```
/// use rowcache::RowId;
///
/// let id = RowId::from_parts(["7", "3"]);
/// assert_eq!(id.as_str(), "7:3");
/// assert_eq!(id.parts(), vec!["7", "3"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(String);

impl RowId {
    /// Wrap an already-joined id string.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        RowId(id.into())
    }

    /// Join key parts in order.
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut id = String::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                id.push(ID_SEPARATOR);
            }
            id.push_str(part.as_ref());
        }
        RowId(id)
    }

    /// The joined id string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the id back into key parts.
    pub fn parts(&self) -> Vec<&str> {
        self.0.split(ID_SEPARATOR).collect()
    }

    /// True when the id cannot address an existing row.
    ///
    /// An id is degenerate if it is empty or consists only of `0` digits and
    /// separators (`"0"`, `":"`, `"0:0"`). A composite id with any non-zero
    /// character, such as `"5:0"`, is meaningful.
    pub fn is_degenerate(&self) -> bool {
        self.0.chars().all(|c| c == '0' || c == ID_SEPARATOR)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(id: &str) -> Self {
        RowId(id.to_string())
    }
}

impl From<String> for RowId {
    fn from(id: String) -> Self {
        RowId(id)
    }
}

impl AsRef<str> for RowId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
