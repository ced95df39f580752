//! Minimal query builder.
//!
//! The engine only ever builds WHERE fragments from primary key identifiers
//! and quoted values, so the builder covers equality conditions, one ORDER BY
//! column and a LIMIT. Everything that reaches SQL text goes through
//! [`quote`] or [`quote_identifier`].

use std::fmt;

use crate::common::Vars;

/// Statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Insert,
    Replace,
    Update,
    Delete,
}

/// A literal that can be quoted into SQL.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal<'a> {
    Null,
    Str(&'a str),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl<'a> From<Option<&'a str>> for Literal<'a> {
    fn from(value: Option<&'a str>) -> Self {
        match value {
            Some(s) => Literal::Str(s),
            None => Literal::Null,
        }
    }
}

impl<'a> From<&'a str> for Literal<'a> {
    fn from(value: &'a str) -> Self {
        Literal::Str(value)
    }
}

impl From<i64> for Literal<'_> {
    fn from(value: i64) -> Self {
        Literal::Int(value)
    }
}

impl From<f64> for Literal<'_> {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<bool> for Literal<'_> {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

/// Escape backslashes and quotes inside a string literal.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

/// Quote a literal for SQL.
///
/// ```
/// use rowcache::storage::quote;
///
/// assert_eq!(quote(Some("it's")), r#""it\'s""#);
/// assert_eq!(quote(None::<&str>), "NULL");
/// assert_eq!(quote(true), "1");
/// assert_eq!(quote(42i64), "42");
/// ```
pub fn quote<'a>(value: impl Into<Literal<'a>>) -> String {
    match value.into() {
        Literal::Null => "NULL".to_string(),
        Literal::Str(s) => format!("\"{}\"", escape(s)),
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) => f.to_string(),
        Literal::Bool(b) => if b { "1" } else { "0" }.to_string(),
    }
}

/// Quote a table or column identifier with backticks.
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "\\`"))
}

/// A statement under construction.
///
/// Column hooks receive `&mut Query` before execution and may add values or
/// SET entries (an edited-at column stamps itself this way).
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    kind: QueryKind,
    table: String,
    values: Vars,
    bulk_columns: Vec<String>,
    bulk_rows: Vec<Vec<Option<String>>>,
    set: Vars,
    conditions: Vec<(String, Option<String>)>,
    order: Option<String>,
    limit: Option<usize>,
    count: bool,
}

impl Query {
    fn new(kind: QueryKind, table: &str) -> Self {
        Self {
            kind,
            table: table.to_string(),
            values: Vars::new(),
            bulk_columns: Vec::new(),
            bulk_rows: Vec::new(),
            set: Vars::new(),
            conditions: Vec::new(),
            order: None,
            limit: None,
            count: false,
        }
    }

    pub fn select(table: &str) -> Self {
        Self::new(QueryKind::Select, table)
    }

    pub fn insert(table: &str) -> Self {
        Self::new(QueryKind::Insert, table)
    }

    pub fn replace(table: &str) -> Self {
        Self::new(QueryKind::Replace, table)
    }

    pub fn update(table: &str) -> Self {
        Self::new(QueryKind::Update, table)
    }

    pub fn delete(table: &str) -> Self {
        Self::new(QueryKind::Delete, table)
    }

    // ========================================================================
    // Builders
    // ========================================================================

    /// Add a column value to an INSERT/REPLACE row.
    pub fn value(&mut self, column: &str, value: Option<String>) -> &mut Self {
        self.values.set(column, value);
        self
    }

    /// Add several column values to an INSERT/REPLACE row.
    pub fn values<I>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        for (k, v) in values {
            self.values.set(k, v);
        }
        self
    }

    /// Turn an INSERT/REPLACE into a multi-row statement.
    pub fn bulk(&mut self, columns: &[&str], rows: Vec<Vec<Option<String>>>) -> &mut Self {
        self.bulk_columns = columns.iter().map(|c| c.to_string()).collect();
        self.bulk_rows = rows;
        self
    }

    /// Add a SET entry to an UPDATE.
    pub fn set(&mut self, column: &str, value: Option<String>) -> &mut Self {
        self.set.set(column, value);
        self
    }

    /// AND an equality condition.
    pub fn where_eq(&mut self, column: &str, value: Option<String>) -> &mut Self {
        self.conditions.push((column.to_string(), value));
        self
    }

    pub fn order_by(&mut self, column: &str) -> &mut Self {
        self.order = Some(column.to_string());
        self
    }

    pub fn limit(&mut self, limit: usize) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    /// Select `COUNT(*)` instead of rows.
    pub fn count(&mut self) -> &mut Self {
        self.count = true;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn set_clause(&self) -> &Vars {
        &self.set
    }

    pub fn conditions(&self) -> &[(String, Option<String>)] {
        &self.conditions
    }

    pub fn order(&self) -> Option<&str> {
        self.order.as_deref()
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    pub fn is_count(&self) -> bool {
        self.count
    }

    /// The rows an INSERT/REPLACE writes.
    pub fn rows(&self) -> Vec<Vars> {
        if self.bulk_columns.is_empty() {
            return vec![self.values.clone()];
        }
        self.bulk_rows
            .iter()
            .map(|row| {
                self.bulk_columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    /// Whether a write statement carries nothing to write.
    pub fn is_empty_write(&self) -> bool {
        match self.kind {
            QueryKind::Update => self.set.is_empty(),
            QueryKind::Insert | QueryKind::Replace => {
                self.values.is_empty() && self.bulk_rows.is_empty()
            }
            QueryKind::Select | QueryKind::Delete => false,
        }
    }

    // ========================================================================
    // SQL rendering
    // ========================================================================

    fn where_sql(&self) -> String {
        if self.conditions.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|(column, value)| match value {
                Some(v) => format!("{} = {}", quote_identifier(column), quote(v.as_str())),
                None => format!("{} IS NULL", quote_identifier(column)),
            })
            .collect();
        format!(" WHERE {}", parts.join(" AND "))
    }

    fn insert_sql(&self, verb: &str) -> String {
        let table = quote_identifier(&self.table);
        if self.bulk_columns.is_empty() {
            let columns: Vec<String> = self.values.keys().map(quote_identifier).collect();
            let values: Vec<String> = self.values.iter().map(|(_, v)| quote(v)).collect();
            return format!(
                "{} INTO {} ({}) VALUES ({})",
                verb,
                table,
                columns.join(", "),
                values.join(", ")
            );
        }
        let columns: Vec<String> = self.bulk_columns.iter().map(|c| quote_identifier(c)).collect();
        let rows: Vec<String> = self
            .bulk_rows
            .iter()
            .map(|row| {
                let values: Vec<String> = row.iter().map(|v| quote(v.as_deref())).collect();
                format!("({})", values.join(", "))
            })
            .collect();
        format!(
            "{} INTO {} ({}) VALUES {}",
            verb,
            table,
            columns.join(", "),
            rows.join(", ")
        )
    }

    /// Render the statement as SQL text.
    pub fn to_sql(&self) -> String {
        let table = quote_identifier(&self.table);
        match self.kind {
            QueryKind::Select => {
                let what = if self.count { "COUNT(*)" } else { "*" };
                let mut sql = format!("SELECT {} FROM {}{}", what, table, self.where_sql());
                if let Some(order) = &self.order {
                    sql.push_str(&format!(" ORDER BY {}", quote_identifier(order)));
                }
                if let Some(limit) = self.limit {
                    sql.push_str(&format!(" LIMIT {}", limit));
                }
                sql
            }
            QueryKind::Insert => self.insert_sql("INSERT"),
            QueryKind::Replace => self.insert_sql("REPLACE"),
            QueryKind::Update => {
                let set: Vec<String> = self
                    .set
                    .iter()
                    .map(|(k, v)| format!("{}={}", quote_identifier(k), quote(v)))
                    .collect();
                format!("UPDATE {} SET {}{}", table, set.join(","), self.where_sql())
            }
            QueryKind::Delete => format!("DELETE FROM {}{}", table, self.where_sql()),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}
