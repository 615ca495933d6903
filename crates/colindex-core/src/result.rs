//! Uniform accessors over query results.
//!
//! A missing column is never an error: typed getters return `Ok(None)`
//! for absent columns and for stored empty or null values, and only fail
//! when a present value cannot be read as the requested type.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::gateway::Column;
use crate::key::RowKey;
use crate::value::{is_empty_value, parse_timestamp};

/// The columns of one row, in the order the store returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: IndexMap<String, Column>,
}

impl Row {
    /// Builds a row from gateway columns.
    #[must_use]
    pub fn from_columns(columns: Vec<Column>) -> Self {
        Self {
            columns: columns.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }

    /// Column with metadata.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Raw string value.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).map(|c| c.value.as_str())
    }

    /// Value read as an integer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Coercion`] if the stored value is not an integer.
    pub fn get_i64(&self, name: &str) -> Result<Option<i64>> {
        self.coerce(name, "integer", |v| v.parse().ok())
    }

    /// Value read as a float.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Coercion`] if the stored value is not a number.
    pub fn get_f64(&self, name: &str) -> Result<Option<f64>> {
        self.coerce(name, "float", |v| v.parse().ok())
    }

    /// Value read as a boolean (`true` / `false`, any case).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Coercion`] for any other stored value.
    pub fn get_bool(&self, name: &str) -> Result<Option<bool>> {
        self.coerce(name, "boolean", |v| {
            if v.eq_ignore_ascii_case("true") {
                Some(true)
            } else if v.eq_ignore_ascii_case("false") {
                Some(false)
            } else {
                None
            }
        })
    }

    /// Value read as a timestamp in the canonical timestamp format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Coercion`] if the stored value does not parse.
    pub fn get_timestamp(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        self.coerce(name, "timestamp", parse_timestamp)
    }

    /// Column names in result order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Columns in result order.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    /// Returns true if the row holds `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn coerce<T>(
        &self,
        name: &str,
        expected: &'static str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Result<Option<T>> {
        let Some(value) = self.get_str(name) else {
            return Ok(None);
        };
        if is_empty_value(Some(value)) {
            return Ok(None);
        }
        parse(value.trim()).map(Some).ok_or_else(|| Error::Coercion {
            column: name.to_string(),
            value: value.to_string(),
            expected,
        })
    }
}

impl IntoIterator for Row {
    type Item = Column;
    type IntoIter = indexmap::map::IntoValues<String, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_values()
    }
}

/// Outcome of looking up one column of one row in a [`RowSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// The row is not part of the result.
    RowNotFound,
    /// The row was found without this column.
    ColumnMissing,
    /// The column value.
    Found(&'a Column),
}

impl<'a> Lookup<'a> {
    /// The column, if found.
    #[must_use]
    pub fn column(self) -> Option<&'a Column> {
        match self {
            Self::Found(column) => Some(column),
            Self::RowNotFound | Self::ColumnMissing => None,
        }
    }
}

/// Rows of a multi-key read, keyed by row key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSet<K: RowKey> {
    rows: IndexMap<K, Row>,
}

impl<K: RowKey> RowSet<K> {
    /// Builds a row set from gateway rows. Rows without columns are
    /// dropped.
    #[must_use]
    pub fn from_rows(rows: Vec<(K, Vec<Column>)>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .filter(|(_, columns)| !columns.is_empty())
                .map(|(key, columns)| (key, Row::from_columns(columns)))
                .collect(),
        }
    }

    /// An empty set.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rows: IndexMap::new(),
        }
    }

    /// Row of `key`, if present.
    #[must_use]
    pub fn row(&self, key: &K) -> Option<&Row> {
        self.rows.get(key)
    }

    /// Looks up one column, keeping "row not found" and "column missing"
    /// apart.
    #[must_use]
    pub fn lookup(&self, key: &K, column: &str) -> Lookup<'_> {
        match self.rows.get(key) {
            None => Lookup::RowNotFound,
            Some(row) => row.get(column).map_or(Lookup::ColumnMissing, Lookup::Found),
        }
    }

    /// Returns true if `key` is part of the result.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.rows.contains_key(key)
    }

    /// Row keys in result order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.rows.keys()
    }

    /// Rows in result order.
    pub fn rows(&self) -> impl Iterator<Item = (&K, &Row)> {
        self.rows.iter()
    }

    /// Keeps only rows for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &Row) -> bool) {
        self.rows.retain(|key, row| keep(key, row));
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no row was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<K: RowKey> Default for RowSet<K> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K: RowKey> IntoIterator for RowSet<K> {
    type Item = (K, Row);
    type IntoIter = indexmap::map::IntoIter<K, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
