//! Storage gateway: the narrow interface to the underlying wide-column store.
//!
//! Everything the engine needs from storage goes through
//! [`StorageGateway`]: point and slice reads of primary rows, multi-key
//! reads, index entry reads, batched mutation submission and counters.
//! Replication, consistency levels and connection handling stay on the
//! other side of this trait.
//!
//! # Layout
//!
//! ```text
//! primary table  <base>                     row K      -> { column name -> value }
//! index table    <base><suffix>             IndexKey   -> { K.encode()  -> K }
//! ```
//!
//! A submitted batch must be applied atomically per row; there is no
//! atomicity across batches.

mod memory;

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::Result;
use crate::key::RowKey;
use crate::policy::IndexKey;

pub use memory::{GatewayOp, InMemoryGateway};

/// A stored column with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Canonical string value.
    pub value: String,
    /// Write timestamp in microseconds, when the store reports one.
    pub timestamp: Option<i64>,
    /// Remaining time to live in seconds, when set.
    pub ttl: Option<i32>,
}

impl Column {
    /// Creates a column without metadata.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            timestamp: None,
            ttl: None,
        }
    }
}

/// A contiguous range of column names within one row.
///
/// Bounds are inclusive; `None` means unbounded. With `reversed`, columns
/// are returned in descending order and `start` is the upper bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSlice {
    /// First column name of the range.
    pub start: Option<String>,
    /// Last column name of the range.
    pub end: Option<String>,
    /// Descending order.
    pub reversed: bool,
    /// Maximum number of columns returned.
    pub count: usize,
}

impl ColumnSlice {
    /// Every column of the row, ascending, up to `count`.
    #[must_use]
    pub fn all(count: usize) -> Self {
        Self {
            start: None,
            end: None,
            reversed: false,
            count,
        }
    }

    /// Columns from `start` to `end` inclusive.
    #[must_use]
    pub fn range(start: impl Into<String>, end: impl Into<String>, count: usize) -> Self {
        Self {
            start: Some(start.into()),
            end: Some(end.into()),
            reversed: false,
            count,
        }
    }

    /// Returns the slice in descending order.
    #[must_use]
    pub fn reversed(mut self) -> Self {
        self.reversed = true;
        self
    }
}

/// A mutation against a primary table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryMutation<K> {
    /// Writes one column.
    Put {
        /// Row key.
        key: K,
        /// Column name.
        column: String,
        /// Canonical value.
        value: String,
        /// Write timestamp; the store assigns one when `None`.
        timestamp: Option<i64>,
        /// Time to live in seconds; `None` means no expiry.
        ttl: Option<u32>,
    },
    /// Deletes one column.
    DeleteColumn {
        /// Row key.
        key: K,
        /// Column name.
        column: String,
        /// Delete timestamp.
        timestamp: Option<i64>,
    },
    /// Deletes a whole row.
    DeleteRow {
        /// Row key.
        key: K,
        /// Delete timestamp.
        timestamp: Option<i64>,
    },
}

impl<K> PrimaryMutation<K> {
    /// Row the mutation touches.
    pub fn key(&self) -> &K {
        match self {
            Self::Put { key, .. } | Self::DeleteColumn { key, .. } | Self::DeleteRow { key, .. } => {
                key
            }
        }
    }

    /// Timestamp carried by the mutation.
    pub fn timestamp(&self) -> Option<i64> {
        match self {
            Self::Put { timestamp, .. }
            | Self::DeleteColumn { timestamp, .. }
            | Self::DeleteRow { timestamp, .. } => *timestamp,
        }
    }
}

/// A mutation against an index table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexMutation<K> {
    /// Adds `member` to the entry at `index_key`.
    Insert {
        /// Index entry.
        index_key: IndexKey,
        /// Primary key being added.
        member: K,
        /// Write timestamp.
        timestamp: Option<i64>,
        /// Time to live in seconds, copied from the primary column.
        ttl: Option<u32>,
    },
    /// Removes `member` from the entry at `index_key`.
    Retract {
        /// Index entry.
        index_key: IndexKey,
        /// Primary key being removed.
        member: K,
        /// Delete timestamp.
        timestamp: Option<i64>,
    },
}

impl<K> IndexMutation<K> {
    /// Index entry the mutation touches.
    pub fn index_key(&self) -> &IndexKey {
        match self {
            Self::Insert { index_key, .. } | Self::Retract { index_key, .. } => index_key,
        }
    }

    /// Primary key the mutation adds or removes.
    pub fn member(&self) -> &K {
        match self {
            Self::Insert { member, .. } | Self::Retract { member, .. } => member,
        }
    }
}

/// An ordered list of mutations for one table, submitted as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationBatch<K> {
    /// Mutations for a primary table.
    Primary {
        /// Primary table name.
        table: String,
        /// Mutations, applied in order.
        mutations: Vec<PrimaryMutation<K>>,
    },
    /// Mutations for an index table.
    Index {
        /// Index table name.
        table: String,
        /// Mutations, applied in order.
        mutations: Vec<IndexMutation<K>>,
    },
}

impl<K> MutationBatch<K> {
    /// Target table.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Primary { table, .. } | Self::Index { table, .. } => table,
        }
    }

    /// Number of mutations.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Primary { mutations, .. } => mutations.len(),
            Self::Index { mutations, .. } => mutations.len(),
        }
    }

    /// Returns true if the batch carries no mutations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interface to the underlying wide-column store.
///
/// All calls are blocking. Implementations report connectivity and
/// timeout failures as [`Error::TransientStorage`](crate::Error::TransientStorage)
/// and own any retry policy.
pub trait StorageGateway<K: RowKey>: Send + Sync {
    /// Reads the named columns of one row. Missing columns are omitted.
    fn get_columns(&self, table: &str, key: &K, columns: &[String]) -> Result<Vec<Column>>;

    /// Reads every column of one row. An absent row yields no columns.
    fn get_row(&self, table: &str, key: &K) -> Result<Vec<Column>>;

    /// Reads a column range of one row.
    fn get_column_slice(&self, table: &str, key: &K, slice: &ColumnSlice) -> Result<Vec<Column>>;

    /// Reads several rows in one call, optionally restricted to the named
    /// columns. Rows without any live column are omitted.
    fn get_rows(
        &self,
        table: &str,
        keys: &BTreeSet<K>,
        columns: Option<&[String]>,
    ) -> Result<Vec<(K, Vec<Column>)>>;

    /// Reads the same column range of several rows in one call. Rows
    /// without any live column in the range are omitted.
    fn get_rows_slice(
        &self,
        table: &str,
        keys: &BTreeSet<K>,
        slice: &ColumnSlice,
    ) -> Result<Vec<(K, Vec<Column>)>>;

    /// Applies an ordered batch atomically per row.
    fn submit_batch(&self, batch: &MutationBatch<K>) -> Result<()>;

    /// Reads the members of several index entries in one call. Entries
    /// without members may be omitted.
    fn query_index_entries(
        &self,
        index_table: &str,
        index_keys: &[IndexKey],
    ) -> Result<HashMap<IndexKey, HashSet<K>>>;

    /// Adds `delta` to a counter column.
    fn add_counter(&self, table: &str, key: &K, column: &str, delta: i64) -> Result<()>;

    /// Reads a counter column.
    fn get_counter(&self, table: &str, key: &K, column: &str) -> Result<Option<i64>>;

    /// Reads one column of one row.
    fn get_column(&self, table: &str, key: &K, column: &str) -> Result<Option<Column>> {
        let columns = self.get_columns(table, key, &[column.to_string()])?;
        Ok(columns.into_iter().find(|c| c.name == column))
    }

    /// Reads the members of one index entry.
    fn query_index_entry(&self, index_table: &str, index_key: &IndexKey) -> Result<HashSet<K>> {
        let mut entries = self.query_index_entries(index_table, std::slice::from_ref(index_key))?;
        Ok(entries.remove(index_key).unwrap_or_default())
    }
}
