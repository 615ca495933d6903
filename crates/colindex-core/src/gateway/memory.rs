//! In-memory storage gateway.
//!
//! Behaves like a single-node wide-column store: last-write-wins by
//! timestamp per cell, per-batch atomicity, and TTL expiry measured on an
//! injectable [`Clock`]. Deletes remove cells outright and leave no
//! tombstones, so a write carrying an older timestamp than an earlier
//! delete is still applied.
//!
//! Reads and batches can be made to fail on demand, which is how the
//! degraded paths of the engine are exercised in tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};

use super::{Column, ColumnSlice, IndexMutation, MutationBatch, PrimaryMutation, StorageGateway};
use crate::clock::{Clock, MonotonicClock, MICROS_PER_SECOND};
use crate::error::{Error, Result};
use crate::key::RowKey;
use crate::policy::IndexKey;

#[derive(Debug, Clone)]
struct Cell {
    value: String,
    timestamp: i64,
    expires_at: Option<i64>,
}

impl Cell {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }

    fn to_column(&self, name: &str, now: i64) -> Column {
        Column {
            name: name.to_string(),
            value: self.value.clone(),
            timestamp: Some(self.timestamp),
            ttl: self.expires_at.map(|at| remaining_secs(at, now)),
        }
    }
}

/// Index pointer. The member key lives only in the column name, as
/// `RowKey::encode` wrote it, and is decoded on every read.
#[derive(Debug, Clone)]
struct IndexCell {
    timestamp: i64,
    expires_at: Option<i64>,
}

impl IndexCell {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

fn remaining_secs(expires_at: i64, now: i64) -> i32 {
    let micros = (expires_at - now).max(0);
    let secs = (micros + MICROS_PER_SECOND - 1) / MICROS_PER_SECOND;
    i32::try_from(secs).unwrap_or(i32::MAX)
}

fn expiry(now: i64, ttl: Option<u32>) -> Option<i64> {
    ttl.map(|secs| now.saturating_add(i64::from(secs).saturating_mul(MICROS_PER_SECOND)))
}

type PrimaryRows<K> = FxHashMap<K, BTreeMap<String, Cell>>;
type IndexRows = FxHashMap<String, BTreeMap<String, IndexCell>>;

struct Tables<K> {
    primary: FxHashMap<String, PrimaryRows<K>>,
    index: FxHashMap<String, IndexRows>,
    counters: FxHashMap<String, FxHashMap<K, BTreeMap<String, i64>>>,
}

impl<K> Default for Tables<K> {
    fn default() -> Self {
        Self {
            primary: FxHashMap::default(),
            index: FxHashMap::default(),
            counters: FxHashMap::default(),
        }
    }
}

/// A recorded gateway call, for asserting round trips and ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOp {
    /// A primary read on `table` touching `rows` keys.
    Read {
        /// Table name.
        table: String,
        /// Number of row keys requested.
        rows: usize,
    },
    /// An index read on `table` for `entries` index keys.
    IndexRead {
        /// Index table name.
        table: String,
        /// Number of index keys requested.
        entries: usize,
    },
    /// A batch accepted for `table`.
    Batch {
        /// Target table.
        table: String,
        /// Number of mutations.
        mutations: usize,
    },
    /// A counter update.
    Counter {
        /// Table name.
        table: String,
    },
}

/// In-memory [`StorageGateway`].
pub struct InMemoryGateway<K: RowKey> {
    tables: RwLock<Tables<K>>,
    clock: Arc<dyn Clock>,
    fail_reads: AtomicBool,
    failing_tables: Mutex<FxHashSet<String>>,
    log: Mutex<Vec<GatewayOp>>,
}

impl<K: RowKey> InMemoryGateway<K> {
    /// Creates an empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    /// Creates an empty store measuring TTLs and default timestamps on
    /// `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            clock,
            fail_reads: AtomicBool::new(false),
            failing_tables: Mutex::new(FxHashSet::default()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Makes every subsequent read fail with a transient error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Release);
    }

    /// Makes batches targeting `table` fail with a transient error.
    pub fn fail_batches_for(&self, table: &str) {
        self.failing_tables.lock().insert(table.to_string());
    }

    /// Clears all injected faults.
    pub fn clear_faults(&self) {
        self.set_fail_reads(false);
        self.failing_tables.lock().clear();
    }

    /// Calls recorded since creation or the last [`Self::clear_operations`].
    #[must_use]
    pub fn operations(&self) -> Vec<GatewayOp> {
        self.log.lock().clone()
    }

    /// Forgets recorded calls.
    pub fn clear_operations(&self) {
        self.log.lock().clear();
    }

    /// Live members of one index entry, read directly without logging.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if a stored member name does not
    /// decode as `K`.
    pub fn index_members(&self, index_table: &str, index_key: &IndexKey) -> Result<BTreeSet<K>> {
        let now = self.clock.now_micros();
        let tables = self.tables.read();
        match tables
            .index
            .get(index_table)
            .and_then(|rows| rows.get(&index_key.encode()))
        {
            Some(cells) => Self::live_members(cells, now),
            None => Ok(BTreeSet::new()),
        }
    }

    /// Index entries of `index_table` holding at least one live member,
    /// decoded from their stored row keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if a stored row key is malformed.
    pub fn index_entries(&self, index_table: &str) -> Result<BTreeSet<IndexKey>> {
        let now = self.clock.now_micros();
        let tables = self.tables.read();
        let Some(rows) = tables.index.get(index_table) else {
            return Ok(BTreeSet::new());
        };
        rows.iter()
            .filter(|(_, cells)| cells.values().any(|c| c.is_live(now)))
            .map(|(encoded, _)| IndexKey::decode(encoded))
            .collect()
    }

    /// Remaining TTL in seconds of one index pointer, if it is live and
    /// expiring.
    #[must_use]
    pub fn index_member_ttl(&self, index_table: &str, index_key: &IndexKey, member: &K) -> Option<i32> {
        let now = self.clock.now_micros();
        self.tables
            .read()
            .index
            .get(index_table)
            .and_then(|rows| rows.get(&index_key.encode()))
            .and_then(|cells| cells.get(&member.encode()))
            .filter(|c| c.is_live(now))
            .and_then(|c| c.expires_at.map(|at| remaining_secs(at, now)))
    }

    /// Physically drops expired cells and empty rows. Returns the number
    /// of cells removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_micros();
        let mut tables = self.tables.write();
        let mut removed = 0;
        for rows in tables.primary.values_mut() {
            for cells in rows.values_mut() {
                let before = cells.len();
                cells.retain(|_, c| c.is_live(now));
                removed += before - cells.len();
            }
            rows.retain(|_, cells| !cells.is_empty());
        }
        for rows in tables.index.values_mut() {
            for cells in rows.values_mut() {
                let before = cells.len();
                cells.retain(|_, c| c.is_live(now));
                removed += before - cells.len();
            }
            rows.retain(|_, cells| !cells.is_empty());
        }
        removed
    }

    fn record(&self, op: GatewayOp) {
        self.log.lock().push(op);
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::Acquire) {
            return Err(Error::TransientStorage("injected read failure".to_string()));
        }
        Ok(())
    }

    fn live_members<C: FromIterator<K>>(cells: &BTreeMap<String, IndexCell>, now: i64) -> Result<C> {
        cells
            .iter()
            .filter(|(_, c)| c.is_live(now))
            .map(|(name, _)| K::decode(name))
            .collect()
    }

    fn live_columns<'a, I>(cells: I, now: i64) -> impl Iterator<Item = Column> + 'a
    where
        I: Iterator<Item = (&'a String, &'a Cell)> + 'a,
    {
        cells
            .filter(move |(_, c)| c.is_live(now))
            .map(move |(name, c)| c.to_column(name, now))
    }

    fn slice_columns(cells: &BTreeMap<String, Cell>, slice: &ColumnSlice, now: i64) -> Vec<Column> {
        // with `reversed` the caller's start is the upper bound
        let (low, high) = if slice.reversed {
            (slice.end.as_deref(), slice.start.as_deref())
        } else {
            (slice.start.as_deref(), slice.end.as_deref())
        };
        let in_range = |name: &String| {
            low.is_none_or(|lo| name.as_str() >= lo) && high.is_none_or(|hi| name.as_str() <= hi)
        };

        let mut selected: Vec<(&String, &Cell)> =
            cells.iter().filter(|(n, _)| in_range(n)).collect();
        if slice.reversed {
            selected.reverse();
        }
        Self::live_columns(selected.into_iter(), now)
            .take(slice.count)
            .collect()
    }

    fn apply_primary(rows: &mut PrimaryRows<K>, mutation: &PrimaryMutation<K>, now: i64) {
        match mutation {
            PrimaryMutation::Put {
                key,
                column,
                value,
                timestamp,
                ttl,
            } => {
                let ts = timestamp.unwrap_or(now);
                let cells = rows.entry(key.clone()).or_default();
                let newer = cells.get(column).is_none_or(|c| c.timestamp <= ts || !c.is_live(now));
                if newer {
                    cells.insert(
                        column.clone(),
                        Cell {
                            value: value.clone(),
                            timestamp: ts,
                            expires_at: expiry(now, *ttl),
                        },
                    );
                }
            }
            PrimaryMutation::DeleteColumn {
                key,
                column,
                timestamp,
            } => {
                let ts = timestamp.unwrap_or(now);
                if let Some(cells) = rows.get_mut(key) {
                    if cells.get(column).is_some_and(|c| c.timestamp <= ts) {
                        cells.remove(column);
                    }
                    if cells.is_empty() {
                        rows.remove(key);
                    }
                }
            }
            PrimaryMutation::DeleteRow { key, timestamp } => {
                let ts = timestamp.unwrap_or(now);
                if let Some(cells) = rows.get_mut(key) {
                    cells.retain(|_, c| c.timestamp > ts);
                    if cells.is_empty() {
                        rows.remove(key);
                    }
                }
            }
        }
    }

    fn apply_index(rows: &mut IndexRows, mutation: &IndexMutation<K>, now: i64) {
        match mutation {
            IndexMutation::Insert {
                index_key,
                member,
                timestamp,
                ttl,
            } => {
                let ts = timestamp.unwrap_or(now);
                let cells = rows.entry(index_key.encode()).or_default();
                let column = member.encode();
                let newer = cells.get(&column).is_none_or(|c| c.timestamp <= ts || !c.is_live(now));
                if newer {
                    cells.insert(
                        column,
                        IndexCell {
                            timestamp: ts,
                            expires_at: expiry(now, *ttl),
                        },
                    );
                }
            }
            IndexMutation::Retract {
                index_key,
                member,
                timestamp,
            } => {
                let ts = timestamp.unwrap_or(now);
                // empty entries stay in place as inert rows
                if let Some(cells) = rows.get_mut(&index_key.encode()) {
                    let column = member.encode();
                    if cells.get(&column).is_some_and(|c| c.timestamp <= ts) {
                        cells.remove(&column);
                    }
                }
            }
        }
    }
}

impl<K: RowKey> Default for InMemoryGateway<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: RowKey> StorageGateway<K> for InMemoryGateway<K> {
    fn get_columns(&self, table: &str, key: &K, columns: &[String]) -> Result<Vec<Column>> {
        self.check_reads()?;
        self.record(GatewayOp::Read {
            table: table.to_string(),
            rows: 1,
        });
        let now = self.clock.now_micros();
        let tables = self.tables.read();
        let Some(cells) = tables.primary.get(table).and_then(|rows| rows.get(key)) else {
            return Ok(Vec::new());
        };
        Ok(columns
            .iter()
            .filter_map(|name| cells.get_key_value(name))
            .filter(|(_, c)| c.is_live(now))
            .map(|(name, c)| c.to_column(name, now))
            .collect())
    }

    fn get_row(&self, table: &str, key: &K) -> Result<Vec<Column>> {
        self.check_reads()?;
        self.record(GatewayOp::Read {
            table: table.to_string(),
            rows: 1,
        });
        let now = self.clock.now_micros();
        let tables = self.tables.read();
        Ok(tables
            .primary
            .get(table)
            .and_then(|rows| rows.get(key))
            .map(|cells| Self::live_columns(cells.iter(), now).collect())
            .unwrap_or_default())
    }

    fn get_column_slice(&self, table: &str, key: &K, slice: &ColumnSlice) -> Result<Vec<Column>> {
        self.check_reads()?;
        self.record(GatewayOp::Read {
            table: table.to_string(),
            rows: 1,
        });
        let now = self.clock.now_micros();
        let tables = self.tables.read();
        Ok(tables
            .primary
            .get(table)
            .and_then(|rows| rows.get(key))
            .map(|cells| Self::slice_columns(cells, slice, now))
            .unwrap_or_default())
    }

    fn get_rows(
        &self,
        table: &str,
        keys: &BTreeSet<K>,
        columns: Option<&[String]>,
    ) -> Result<Vec<(K, Vec<Column>)>> {
        self.check_reads()?;
        self.record(GatewayOp::Read {
            table: table.to_string(),
            rows: keys.len(),
        });
        let now = self.clock.now_micros();
        let tables = self.tables.read();
        let Some(rows) = tables.primary.get(table) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(cells) = rows.get(key) else {
                continue;
            };
            let found: Vec<Column> = match columns {
                Some(names) => names
                    .iter()
                    .filter_map(|name| cells.get_key_value(name))
                    .filter(|(_, c)| c.is_live(now))
                    .map(|(name, c)| c.to_column(name, now))
                    .collect(),
                None => Self::live_columns(cells.iter(), now).collect(),
            };
            if !found.is_empty() {
                out.push((key.clone(), found));
            }
        }
        Ok(out)
    }

    fn get_rows_slice(
        &self,
        table: &str,
        keys: &BTreeSet<K>,
        slice: &ColumnSlice,
    ) -> Result<Vec<(K, Vec<Column>)>> {
        self.check_reads()?;
        self.record(GatewayOp::Read {
            table: table.to_string(),
            rows: keys.len(),
        });
        let now = self.clock.now_micros();
        let tables = self.tables.read();
        let Some(rows) = tables.primary.get(table) else {
            return Ok(Vec::new());
        };

        Ok(keys
            .iter()
            .filter_map(|key| {
                let found = Self::slice_columns(rows.get(key)?, slice, now);
                (!found.is_empty()).then(|| (key.clone(), found))
            })
            .collect())
    }

    fn submit_batch(&self, batch: &MutationBatch<K>) -> Result<()> {
        if self.failing_tables.lock().contains(batch.table()) {
            return Err(Error::TransientStorage(format!(
                "injected batch failure for table '{}'",
                batch.table()
            )));
        }

        let now = self.clock.now_micros();
        {
            let mut tables = self.tables.write();
            match batch {
                MutationBatch::Primary { table, mutations } => {
                    let rows = tables.primary.entry(table.clone()).or_default();
                    for mutation in mutations {
                        Self::apply_primary(rows, mutation, now);
                    }
                }
                MutationBatch::Index { table, mutations } => {
                    let rows = tables.index.entry(table.clone()).or_default();
                    for mutation in mutations {
                        Self::apply_index(rows, mutation, now);
                    }
                }
            }
        }

        self.record(GatewayOp::Batch {
            table: batch.table().to_string(),
            mutations: batch.len(),
        });
        Ok(())
    }

    fn query_index_entries(
        &self,
        index_table: &str,
        index_keys: &[IndexKey],
    ) -> Result<HashMap<IndexKey, HashSet<K>>> {
        self.check_reads()?;
        self.record(GatewayOp::IndexRead {
            table: index_table.to_string(),
            entries: index_keys.len(),
        });
        let now = self.clock.now_micros();
        let tables = self.tables.read();
        let Some(rows) = tables.index.get(index_table) else {
            return Ok(HashMap::new());
        };

        let mut out = HashMap::with_capacity(index_keys.len());
        for index_key in index_keys {
            if let Some(cells) = rows.get(&index_key.encode()) {
                let members: HashSet<K> = Self::live_members(cells, now)?;
                if !members.is_empty() {
                    out.insert(index_key.clone(), members);
                }
            }
        }
        Ok(out)
    }

    fn add_counter(&self, table: &str, key: &K, column: &str, delta: i64) -> Result<()> {
        if self.failing_tables.lock().contains(table) {
            return Err(Error::TransientStorage(format!(
                "injected counter failure for table '{table}'"
            )));
        }
        {
            let mut tables = self.tables.write();
            let value = tables
                .counters
                .entry(table.to_string())
                .or_default()
                .entry(key.clone())
                .or_default()
                .entry(column.to_string())
                .or_insert(0);
            *value = value.saturating_add(delta);
        }
        self.record(GatewayOp::Counter {
            table: table.to_string(),
        });
        Ok(())
    }

    fn get_counter(&self, table: &str, key: &K, column: &str) -> Result<Option<i64>> {
        self.check_reads()?;
        self.record(GatewayOp::Read {
            table: table.to_string(),
            rows: 1,
        });
        Ok(self
            .tables
            .read()
            .counters
            .get(table)
            .and_then(|rows| rows.get(key))
            .and_then(|cols| cols.get(column))
            .copied())
    }
}
