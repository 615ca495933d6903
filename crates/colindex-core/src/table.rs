//! Indexed table facade.
//!
//! [`IndexedTable`] is the surface callers use: column and row reads and
//! writes against one primary table, with the table's secondary indexes
//! maintained on every write and queryable by value or by presence.
//!
//! Every caller argument is validated before the first storage call. A
//! write either succeeds (index and primary batches both accepted) or
//! reports the failing stage through [`Error::BatchFailed`].

use std::collections::{BTreeSet, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::batch::BatchAssembler;
use crate::clock::{Clock, MonotonicClock};
use crate::config::ColindexConfig;
use crate::error::{Error, Result};
use crate::gateway::{Column, ColumnSlice, StorageGateway};
use crate::key::{validate_column, RowKey};
use crate::planner::{ColumnWrite, IndexMutationPlanner, MutationPlan, ReadBeforeWrite};
use crate::policy::{IndexKey, IndexPolicy};
use crate::result::{Row, RowSet};
use crate::value::{is_empty_value, ColumnValue};

/// Timestamp and TTL of a single-column write or delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Explicit timestamp in microseconds; `None` or `<= 0` assigns one.
    pub timestamp: Option<i64>,
    /// TTL in seconds; `None` or `<= 0` means no expiry.
    pub ttl: Option<i32>,
}

impl WriteOptions {
    /// No explicit timestamp, no TTL.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timestamp: None,
            ttl: None,
        }
    }

    /// Sets the explicit timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the TTL.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: i32) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// A multi-column write to one row.
///
/// Columns without an entry in `timestamps` share one clock reading taken
/// for the whole update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowUpdate {
    /// Column values, written in insertion order.
    pub columns: IndexMap<String, ColumnValue>,
    /// Per-column explicit timestamps.
    pub timestamps: HashMap<String, i64>,
    /// Per-column TTLs.
    pub ttls: HashMap<String, i32>,
}

impl RowUpdate {
    /// An empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column value.
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<ColumnValue>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    /// Sets a column value with its own timestamp and TTL.
    #[must_use]
    pub fn set_with(
        mut self,
        column: impl Into<String>,
        value: impl Into<ColumnValue>,
        options: WriteOptions,
    ) -> Self {
        let column = column.into();
        if let Some(ts) = options.timestamp {
            self.timestamps.insert(column.clone(), ts);
        }
        if let Some(ttl) = options.ttl {
            self.ttls.insert(column.clone(), ttl);
        }
        self.columns.insert(column, value.into());
        self
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if no column is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A primary table with its secondary indexes.
pub struct IndexedTable<K: RowKey, G: StorageGateway<K>> {
    gateway: Arc<G>,
    table: String,
    index_table: String,
    policy: IndexPolicy,
    clock: Arc<dyn Clock>,
    _key: PhantomData<fn() -> K>,
}

impl<K: RowKey, G: StorageGateway<K>> IndexedTable<K, G> {
    /// Creates a table handle using a [`MonotonicClock`] for timestamps.
    ///
    /// # Arguments
    ///
    /// * `gateway` - Storage the table lives in
    /// * `table` - Primary table name
    /// * `policy` - Which columns are indexed
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the table name is empty.
    pub fn new(gateway: Arc<G>, table: impl Into<String>, policy: IndexPolicy) -> Result<Self> {
        let table = table.into();
        if table.is_empty() {
            return Err(Error::Config("table name must not be empty".to_string()));
        }
        let index_table = policy.index_table_name(&table);

        tracing::debug!(
            table = %table,
            index_table = %index_table,
            indexing = policy.is_indexing_enabled(),
            "indexed table opened"
        );

        Ok(Self {
            gateway,
            table,
            index_table,
            policy,
            clock: Arc::new(MonotonicClock::new()),
            _key: PhantomData,
        })
    }

    /// Creates a table handle with the policy declared for `table` in
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn from_config(gateway: Arc<G>, table: &str, config: &ColindexConfig) -> Result<Self> {
        config.validate()?;
        let policy = config.policy_for(table)?;
        Self::new(gateway, table, policy)
    }

    /// Replaces the timestamp source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Primary table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.table
    }

    /// Index table name.
    #[must_use]
    pub fn index_table(&self) -> &str {
        &self.index_table
    }

    /// Index policy of this table.
    #[must_use]
    pub fn policy(&self) -> &IndexPolicy {
        &self.policy
    }

    /// Underlying gateway.
    #[must_use]
    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Reads one column value.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid arguments or a failed read.
    pub fn read_string(&self, key: &K, column: &str) -> Result<Option<String>> {
        Ok(self.read_column(key, column)?.map(|c| c.value))
    }

    /// Reads one column with its timestamp and TTL.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid arguments or a failed read.
    pub fn read_column(&self, key: &K, column: &str) -> Result<Option<Column>> {
        key.validate()?;
        validate_column(column)?;
        self.gateway.get_column(&self.table, key, column)
    }

    /// Reads the named columns of one row.
    ///
    /// Returns `None` when the row has no live column at all, and an
    /// empty [`Row`] when the row exists without any of the named columns.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid arguments or a failed read.
    pub fn read_columns(&self, key: &K, columns: &[&str]) -> Result<Option<Row>> {
        key.validate()?;
        let names = owned_columns(columns)?;
        let found = if names.is_empty() {
            Vec::new()
        } else {
            self.gateway.get_columns(&self.table, key, &names)?
        };
        if !found.is_empty() {
            return Ok(Some(Row::from_columns(found)));
        }

        // one-column probe tells an absent row from absent columns
        let exists = !self
            .gateway
            .get_column_slice(&self.table, key, &ColumnSlice::all(1))?
            .is_empty();
        Ok(exists.then(Row::default))
    }

    /// Reads a whole row. Returns `None` if the row has no live column.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid key or a failed read.
    pub fn read_row(&self, key: &K) -> Result<Option<Row>> {
        key.validate()?;
        let columns = self.gateway.get_row(&self.table, key)?;
        Ok((!columns.is_empty()).then(|| Row::from_columns(columns)))
    }

    /// Reads a range of columns of one row.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid arguments or a failed read.
    pub fn read_slice(&self, key: &K, slice: &ColumnSlice) -> Result<Row> {
        key.validate()?;
        for bound in [&slice.start, &slice.end].into_iter().flatten() {
            validate_column(bound)?;
        }
        Ok(Row::from_columns(
            self.gateway.get_column_slice(&self.table, key, slice)?,
        ))
    }

    /// Reads several whole rows in one call.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid key or a failed read.
    pub fn read_rows<'a>(&self, keys: impl IntoIterator<Item = &'a K>) -> Result<RowSet<K>> {
        let keys = validated_keys(keys)?;
        self.multi_get(&keys, None)
    }

    /// Reads the same column range of several rows in one call. Rows with
    /// no live column in the range are left out of the result.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid arguments or a failed read.
    pub fn read_rows_slice<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a K>,
        slice: &ColumnSlice,
    ) -> Result<RowSet<K>> {
        let keys = validated_keys(keys)?;
        for bound in [&slice.start, &slice.end].into_iter().flatten() {
            validate_column(bound)?;
        }
        if keys.is_empty() {
            return Ok(RowSet::empty());
        }
        Ok(RowSet::from_rows(
            self.gateway.get_rows_slice(&self.table, &keys, slice)?,
        ))
    }

    /// Reads the named columns of several rows in one call.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid arguments or a failed read.
    pub fn read_rows_columns<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a K>,
        columns: &[&str],
    ) -> Result<RowSet<K>> {
        let keys = validated_keys(keys)?;
        let names = owned_columns(columns)?;
        if names.is_empty() {
            return Ok(RowSet::empty());
        }
        self.multi_get(&keys, Some(&names))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Writes one text column.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid arguments or a rejected batch.
    pub fn update_string(
        &self,
        key: &K,
        column: &str,
        value: &str,
        options: WriteOptions,
    ) -> Result<()> {
        self.update_value(key, column, value, options)
    }

    /// Writes one typed column.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid arguments or a rejected batch.
    pub fn update_value(
        &self,
        key: &K,
        column: &str,
        value: impl Into<ColumnValue>,
        options: WriteOptions,
    ) -> Result<()> {
        key.validate()?;
        validate_column(column)?;
        let write = ColumnWrite::new(column, value.into().canonical()?)
            .with_ttl(options.ttl)
            .with_timestamp(options.timestamp);

        let mut plan = MutationPlan::new();
        self.planner()
            .plan_column_write(&mut plan, &self.prior(), key, &write);
        self.submit(plan)
    }

    /// Writes several columns of one row as one logical operation.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid arguments or a rejected batch.
    pub fn update_row(&self, key: &K, update: &RowUpdate) -> Result<()> {
        key.validate()?;
        let writes = update
            .columns
            .iter()
            .map(|(column, value)| -> Result<ColumnWrite> {
                validate_column(column)?;
                Ok(ColumnWrite::new(column.as_str(), value.canonical()?)
                    .with_ttl(update.ttls.get(column).copied())
                    .with_timestamp(update.timestamps.get(column).copied()))
            })
            .collect::<Result<Vec<_>>>()?;
        if writes.is_empty() {
            return Ok(());
        }

        let mut plan = MutationPlan::new();
        self.planner()
            .plan_row_write(&mut plan, &self.prior(), key, &writes);
        self.submit(plan)
    }

    /// Deletes one column.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid arguments or a rejected batch.
    pub fn delete_column(&self, key: &K, column: &str, timestamp: Option<i64>) -> Result<()> {
        self.delete_columns(key, &[column], timestamp)
    }

    /// Deletes several columns of one row as one logical operation.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid arguments or a rejected batch.
    pub fn delete_columns(&self, key: &K, columns: &[&str], timestamp: Option<i64>) -> Result<()> {
        key.validate()?;
        let names = owned_columns(columns)?;
        if names.is_empty() {
            return Ok(());
        }

        let mut plan = MutationPlan::new();
        self.planner()
            .plan_columns_delete(&mut plan, &self.prior(), key, &names, timestamp);
        self.submit(plan)
    }

    /// Deletes a whole row and its index memberships.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid key or a rejected batch.
    pub fn delete_row(&self, key: &K, timestamp: Option<i64>) -> Result<()> {
        key.validate()?;

        let mut plan = MutationPlan::new();
        self.planner()
            .plan_row_delete(&mut plan, &self.prior(), key, timestamp);
        self.submit(plan)
    }

    // ========================================================================
    // Counters
    // ========================================================================

    /// Adds `delta` to a counter column. Counters are never indexed.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid arguments or a failed update.
    pub fn update_counter(&self, key: &K, column: &str, delta: i64) -> Result<()> {
        key.validate()?;
        validate_column(column)?;
        self.gateway.add_counter(&self.table, key, column, delta)
    }

    /// Adds one to a counter column.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid arguments or a failed update.
    pub fn increment_counter(&self, key: &K, column: &str) -> Result<()> {
        self.update_counter(key, column, 1)
    }

    /// Subtracts one from a counter column.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid arguments or a failed update.
    pub fn decrement_counter(&self, key: &K, column: &str) -> Result<()> {
        self.update_counter(key, column, -1)
    }

    /// Current counter value, 0 when the counter was never written.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid arguments or a failed read.
    pub fn get_counter_value(&self, key: &K, column: &str) -> Result<i64> {
        key.validate()?;
        validate_column(column)?;
        Ok(self
            .gateway
            .get_counter(&self.table, key, column)?
            .unwrap_or(0))
    }

    // ========================================================================
    // Secondary queries
    // ========================================================================

    /// Rows whose `column` currently indexes `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotIndexed`] if `column` has no value index.
    pub fn retrieve_by_secondary_index(
        &self,
        column: &str,
        value: impl Into<ColumnValue>,
    ) -> Result<RowSet<K>> {
        self.retrieve_by_secondary_index_values(column, [value])
    }

    /// Rows whose `column` indexes any of `values`, with one index read
    /// and one primary read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotIndexed`] if `column` has no value index.
    pub fn retrieve_by_secondary_index_values<V: Into<ColumnValue>>(
        &self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<RowSet<K>> {
        let index_keys = self.value_index_keys(column, values)?;
        let members = self.index_members(&index_keys)?;
        self.multi_get(&members, None)
    }

    /// Rows that hold `column`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotIndexed`] if `column` has no existence index.
    pub fn retrieve_by_existence_index(&self, column: &str) -> Result<RowSet<K>> {
        let members = self.keys_by_existence_index(column)?;
        self.multi_get(&members, None)
    }

    /// Like [`Self::retrieve_by_secondary_index`], but drops rows whose
    /// current value no longer matches, which hides stale index pointers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotIndexed`] if `column` has no value index.
    pub fn retrieve_by_secondary_index_validated(
        &self,
        column: &str,
        value: impl Into<ColumnValue>,
    ) -> Result<RowSet<K>> {
        let value = value.into().canonical()?;
        let mut rows = self.retrieve_by_secondary_index(column, value.as_str())?;
        let before = rows.len();
        rows.retain(|_, row| row.get_str(column) == Some(value.as_str()));
        if rows.len() < before {
            tracing::debug!(
                table = %self.table,
                column,
                stale = before - rows.len(),
                "dropped stale index pointers"
            );
        }
        Ok(rows)
    }

    /// Primary keys indexed under `(column, value)`, without reading the
    /// primary rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotIndexed`] if `column` has no value index.
    pub fn keys_by_secondary_index(
        &self,
        column: &str,
        value: impl Into<ColumnValue>,
    ) -> Result<BTreeSet<K>> {
        let index_keys = self.value_index_keys(column, [value])?;
        self.index_members(&index_keys)
    }

    /// Primary keys of rows holding `column`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotIndexed`] if `column` has no existence index.
    pub fn keys_by_existence_index(&self, column: &str) -> Result<BTreeSet<K>> {
        validate_column(column)?;
        if !self.policy.is_existence_indexed(column) {
            return Err(self.not_indexed(column, "existence"));
        }
        self.index_members(&[IndexKey::existence(column)])
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn planner(&self) -> IndexMutationPlanner<'_> {
        IndexMutationPlanner::new(&self.policy)
    }

    fn prior(&self) -> ReadBeforeWrite<'_, K, G> {
        ReadBeforeWrite::new(self.gateway.as_ref(), &self.table)
    }

    fn submit(&self, plan: MutationPlan<K>) -> Result<()> {
        BatchAssembler::new(
            self.gateway.as_ref(),
            self.clock.as_ref(),
            &self.table,
            &self.index_table,
        )
        .submit(plan)
        .map(|_| ())
    }

    fn not_indexed(&self, column: &str, kind: &'static str) -> Error {
        Error::NotIndexed {
            table: self.table.clone(),
            column: column.to_string(),
            kind,
        }
    }

    fn value_index_keys<V: Into<ColumnValue>>(
        &self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Vec<IndexKey>> {
        validate_column(column)?;
        if !self.policy.is_value_indexed(column) {
            return Err(self.not_indexed(column, "value"));
        }

        let mut canonical = BTreeSet::new();
        for value in values {
            let value = value.into().canonical()?;
            // empty values are never inserted, so there is nothing to find
            if !is_empty_value(Some(value.as_str())) {
                canonical.insert(value);
            }
        }
        Ok(canonical
            .iter()
            .map(|v| IndexKey::value(column, v))
            .collect())
    }

    fn index_members(&self, index_keys: &[IndexKey]) -> Result<BTreeSet<K>> {
        if index_keys.is_empty() {
            return Ok(BTreeSet::new());
        }

        let entries = self
            .gateway
            .query_index_entries(&self.index_table, index_keys)?;
        let members: BTreeSet<K> = entries.into_values().flatten().collect();

        tracing::debug!(
            index_table = %self.index_table,
            index_keys = index_keys.len(),
            members = members.len(),
            "index fan-out"
        );
        Ok(members)
    }

    fn multi_get(&self, keys: &BTreeSet<K>, columns: Option<&[String]>) -> Result<RowSet<K>> {
        if keys.is_empty() {
            return Ok(RowSet::empty());
        }
        let rows = self.gateway.get_rows(&self.table, keys, columns)?;
        Ok(RowSet::from_rows(rows))
    }
}

fn owned_columns(columns: &[&str]) -> Result<Vec<String>> {
    columns
        .iter()
        .map(|c| validate_column(c).map(|()| (*c).to_string()))
        .collect()
}

fn validated_keys<'a, K: RowKey>(keys: impl IntoIterator<Item = &'a K>) -> Result<BTreeSet<K>> {
    keys.into_iter()
        .map(|k| k.validate().map(|()| k.clone()))
        .collect()
}
