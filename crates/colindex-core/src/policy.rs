//! Index policy registry.
//!
//! An [`IndexPolicy`] says, for one primary table, which columns carry a
//! value index, which carry an existence index, where the index table
//! lives, and how index row keys are encoded. Policies are immutable once
//! built; each table instance owns its own.

use std::collections::BTreeSet;
use std::fmt;

use regex::Regex;

use crate::error::{Error, Result};

/// Default suffix appended to a primary table name to name its index table.
pub const DEFAULT_INDEX_SUFFIX: &str = "_Secondary_Idx";

/// Row key of an index entry: `(column, value)` for value indexes,
/// `(column, "")` for existence indexes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexKey {
    column: String,
    value: String,
}

impl IndexKey {
    /// Index key for a value index entry.
    #[must_use]
    pub fn value(column: &str, value: &str) -> Self {
        Self {
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    /// Index key for an existence index entry.
    #[must_use]
    pub fn existence(column: &str) -> Self {
        Self::value(column, "")
    }

    /// Column part of the key.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Value part of the key (empty for existence entries).
    #[must_use]
    pub fn value_part(&self) -> &str {
        &self.value
    }

    /// Returns true for existence entries.
    #[must_use]
    pub fn is_existence(&self) -> bool {
        self.value.is_empty()
    }

    /// Encodes the key as `<column byte length>:<column>:<value>`.
    ///
    /// The length prefix keeps the encoding unambiguous for column names
    /// that themselves contain `:`.
    #[must_use]
    pub fn encode(&self) -> String {
        format!("{}:{}:{}", self.column.len(), self.column, self.value)
    }

    /// Decodes a key produced by [`IndexKey::encode`], as stored in the
    /// row keys of an index table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for malformed input.
    pub fn decode(encoded: &str) -> Result<Self> {
        let malformed = || Error::InvalidKey(format!("malformed index key '{encoded}'"));
        let (len, rest) = encoded.split_once(':').ok_or_else(malformed)?;
        let len: usize = len.parse().map_err(|_| malformed())?;
        let column = rest.get(..len).ok_or_else(malformed)?;
        let value = rest
            .get(len..)
            .and_then(|tail| tail.strip_prefix(':'))
            .ok_or_else(malformed)?;
        Ok(Self::value(column, value))
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Which columns of a table are indexed, and how.
#[derive(Debug, Clone)]
pub struct IndexPolicy {
    value_columns: BTreeSet<String>,
    existence_columns: BTreeSet<String>,
    existence_pattern: Option<Regex>,
    suffix: String,
    index_table: Option<String>,
}

impl IndexPolicy {
    /// Starts building a policy.
    #[must_use]
    pub fn builder() -> IndexPolicyBuilder {
        IndexPolicyBuilder::default()
    }

    /// A policy with no indexed columns.
    #[must_use]
    pub fn none() -> Self {
        Self {
            value_columns: BTreeSet::new(),
            existence_columns: BTreeSet::new(),
            existence_pattern: None,
            suffix: DEFAULT_INDEX_SUFFIX.to_string(),
            index_table: None,
        }
    }

    /// Returns true if `column` has a by-name-and-value index.
    #[must_use]
    pub fn is_value_indexed(&self, column: &str) -> bool {
        self.value_columns.contains(column)
    }

    /// Returns true if `column` has a by-name-only (existence) index,
    /// either listed explicitly or matched by the naming rule.
    #[must_use]
    pub fn is_existence_indexed(&self, column: &str) -> bool {
        self.existence_columns.contains(column)
            || self
                .existence_pattern
                .as_ref()
                .is_some_and(|re| re.is_match(column))
    }

    /// Naming rule for existence-indexed columns, if any.
    #[must_use]
    pub fn existence_pattern(&self) -> Option<&Regex> {
        self.existence_pattern.as_ref()
    }

    /// Columns carrying a value index.
    pub fn value_columns(&self) -> impl Iterator<Item = &str> {
        self.value_columns.iter().map(String::as_str)
    }

    /// Returns true if any column has a value index.
    #[must_use]
    pub fn has_value_indexes(&self) -> bool {
        !self.value_columns.is_empty()
    }

    /// Returns true if any column can have an existence index.
    #[must_use]
    pub fn has_existence_indexes(&self) -> bool {
        !self.existence_columns.is_empty() || self.existence_pattern.is_some()
    }

    /// Returns true if the table needs an index table at all.
    #[must_use]
    pub fn is_indexing_enabled(&self) -> bool {
        self.has_value_indexes() || self.has_existence_indexes()
    }

    /// Name of the index table for `base_table`.
    #[must_use]
    pub fn index_table_name(&self, base_table: &str) -> String {
        self.index_table
            .clone()
            .unwrap_or_else(|| format!("{base_table}{}", self.suffix))
    }
}

impl Default for IndexPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Builder for [`IndexPolicy`].
#[derive(Debug, Default)]
pub struct IndexPolicyBuilder {
    value_columns: BTreeSet<String>,
    existence_columns: BTreeSet<String>,
    existence_pattern: Option<String>,
    suffix: Option<String>,
    index_table: Option<String>,
}

impl IndexPolicyBuilder {
    /// Adds a value-indexed column.
    #[must_use]
    pub fn value_column(mut self, column: impl Into<String>) -> Self {
        self.value_columns.insert(column.into());
        self
    }

    /// Adds several value-indexed columns.
    #[must_use]
    pub fn value_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.value_columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Adds an explicitly existence-indexed column.
    #[must_use]
    pub fn existence_column(mut self, column: impl Into<String>) -> Self {
        self.existence_columns.insert(column.into());
        self
    }

    /// Adds several existence-indexed columns.
    #[must_use]
    pub fn existence_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.existence_columns
            .extend(columns.into_iter().map(Into::into));
        self
    }

    /// Sets the existence naming rule. The pattern must match the whole
    /// column name.
    #[must_use]
    pub fn existence_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.existence_pattern = Some(pattern.into());
        self
    }

    /// Overrides the index table suffix.
    #[must_use]
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Overrides the derived index table name.
    #[must_use]
    pub fn index_table(mut self, name: impl Into<String>) -> Self {
        self.index_table = Some(name.into());
        self
    }

    /// Builds the policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for empty column names, an empty suffix,
    /// or an invalid pattern.
    pub fn build(self) -> Result<IndexPolicy> {
        if let Some(empty) = self
            .value_columns
            .iter()
            .chain(&self.existence_columns)
            .find(|c| c.is_empty())
        {
            return Err(Error::Config(format!(
                "indexed column name must not be empty (got '{empty}')"
            )));
        }

        let suffix = self
            .suffix
            .unwrap_or_else(|| DEFAULT_INDEX_SUFFIX.to_string());
        if suffix.is_empty() && self.index_table.is_none() {
            return Err(Error::Config(
                "index table suffix must not be empty".to_string(),
            ));
        }

        let existence_pattern = self
            .existence_pattern
            .map(|p| {
                Regex::new(&format!("^(?:{p})$"))
                    .map_err(|e| Error::Config(format!("invalid existence pattern '{p}': {e}")))
            })
            .transpose()?;

        Ok(IndexPolicy {
            value_columns: self.value_columns,
            existence_columns: self.existence_columns,
            existence_pattern,
            suffix,
            index_table: self.index_table,
        })
    }
}
