//! Index mutation planner.
//!
//! Turns one logical write into a [`MutationPlan`]: the index retractions
//! for values being overwritten or deleted, the index insertions for new
//! values, and the primary mutation itself.
//!
//! Maintaining a value index without a transactional read-modify-write
//! means reading the previous value before overwriting it
//! (compare-and-retract). That read goes through [`PriorState`] so a store
//! with conditional writes can plug in a different strategy; the default
//! [`ReadBeforeWrite`] does a plain read that is not atomic with the
//! later batch, and treats a failed read as "no prior value".
//!
//! # Example
//!
//! ```rust,ignore
//! let planner = IndexMutationPlanner::new(&policy);
//! let prior = ReadBeforeWrite::new(&gateway, "users");
//! let mut plan = MutationPlan::new();
//! planner.plan_column_write(&mut plan, &prior, &1, &ColumnWrite::new("status", "active"));
//! ```

mod plan;
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::marker::PhantomData;

use crate::gateway::{Column, StorageGateway};
use crate::key::RowKey;
use crate::policy::{IndexKey, IndexPolicy};
use crate::value::is_empty_value;

pub use plan::{MutationPlan, PlannedOp, Target};

/// Which prior columns a planner needs.
#[derive(Debug, Clone, Copy)]
pub enum PriorScope<'a> {
    /// Only the named columns.
    Named(&'a [String]),
    /// The whole row.
    WholeRow,
}

/// Source of the state a row had before the write being planned.
pub trait PriorState<K> {
    /// Current columns of `key` within `scope`. Implementations return an
    /// empty list when the state is unknown.
    fn prior_columns(&self, key: &K, scope: PriorScope<'_>) -> Vec<Column>;
}

/// Default [`PriorState`]: reads the primary table through the gateway.
///
/// A failed read is logged and treated as "no prior value", which favours
/// write availability. When the failure was not really an absent value
/// the old index pointer is never retracted and stays stale until the
/// row is written again.
pub struct ReadBeforeWrite<'g, K, G: ?Sized> {
    gateway: &'g G,
    table: &'g str,
    _key: PhantomData<fn(&K)>,
}

impl<'g, K, G: ?Sized> ReadBeforeWrite<'g, K, G> {
    /// Reads prior state of `table` through `gateway`.
    #[must_use]
    pub fn new(gateway: &'g G, table: &'g str) -> Self {
        Self {
            gateway,
            table,
            _key: PhantomData,
        }
    }
}

impl<K: RowKey, G: StorageGateway<K> + ?Sized> PriorState<K> for ReadBeforeWrite<'_, K, G> {
    fn prior_columns(&self, key: &K, scope: PriorScope<'_>) -> Vec<Column> {
        let result = match scope {
            PriorScope::Named(names) if names.is_empty() => return Vec::new(),
            PriorScope::Named(names) => self.gateway.get_columns(self.table, key, names),
            PriorScope::WholeRow => self.gateway.get_row(self.table, key),
        };
        result.unwrap_or_else(|err| {
            tracing::warn!(
                table = self.table,
                key = ?key,
                error = %err,
                "prior-value read failed, skipping index retraction"
            );
            Vec::new()
        })
    }
}

/// One column of a logical write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnWrite {
    /// Column name.
    pub column: String,
    /// Canonical value.
    pub value: String,
    /// TTL in seconds; `None` or `<= 0` means no expiry.
    pub ttl: Option<i32>,
    /// Explicit timestamp; `None` or `<= 0` means "assign one".
    pub timestamp: Option<i64>,
}

impl ColumnWrite {
    /// A column write without TTL or explicit timestamp.
    #[must_use]
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
            ttl: None,
            timestamp: None,
        }
    }

    /// Sets the TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<i32>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the explicit timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Option<i64>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Decides which index mutations a write requires.
#[derive(Debug, Clone, Copy)]
pub struct IndexMutationPlanner<'p> {
    policy: &'p IndexPolicy,
}

impl<'p> IndexMutationPlanner<'p> {
    /// Plans against `policy`.
    #[must_use]
    pub fn new(policy: &'p IndexPolicy) -> Self {
        Self { policy }
    }

    /// Plans a single column write.
    pub fn plan_column_write<K: RowKey>(
        &self,
        plan: &mut MutationPlan<K>,
        prior: &impl PriorState<K>,
        key: &K,
        write: &ColumnWrite,
    ) {
        self.plan_row_write(plan, prior, key, std::slice::from_ref(write));
    }

    /// Plans a multi-column write to one row.
    ///
    /// Prior values of all value-indexed columns are read in one call.
    /// For each column, in input order: retraction of the old value,
    /// insertion of the new value, existence insertion, then the primary
    /// put. Rewriting the current value still emits both index mutations;
    /// the retraction precedes the insertion, so the entry survives.
    pub fn plan_row_write<K: RowKey>(
        &self,
        plan: &mut MutationPlan<K>,
        prior: &impl PriorState<K>,
        key: &K,
        writes: &[ColumnWrite],
    ) {
        let indexed: Vec<String> = writes
            .iter()
            .filter(|w| self.policy.is_value_indexed(&w.column))
            .map(|w| w.column.clone())
            .collect();
        let old_values = self.read_prior(prior, key, PriorScope::Named(&indexed));

        for write in writes {
            let column = write.column.as_str();
            if self.policy.is_value_indexed(column) {
                let old = old_values.get(column).map(String::as_str);
                if !is_empty_value(old) {
                    plan.push(PlannedOp::Retract {
                        index_key: IndexKey::value(column, old.unwrap_or_default()),
                        member: key.clone(),
                        timestamp: write.timestamp,
                    });
                }
                if !is_empty_value(Some(write.value.as_str())) {
                    plan.push(PlannedOp::Insert {
                        index_key: IndexKey::value(column, &write.value),
                        member: key.clone(),
                        ttl: write.ttl,
                        timestamp: write.timestamp,
                    });
                }
            }

            if self.policy.is_existence_indexed(column) {
                plan.push(PlannedOp::Insert {
                    index_key: IndexKey::existence(column),
                    member: key.clone(),
                    ttl: write.ttl,
                    timestamp: write.timestamp,
                });
            }

            plan.push(PlannedOp::Put {
                key: key.clone(),
                column: write.column.clone(),
                value: write.value.clone(),
                ttl: write.ttl,
                timestamp: write.timestamp,
            });
        }
    }

    /// Plans deletion of one column.
    pub fn plan_column_delete<K: RowKey>(
        &self,
        plan: &mut MutationPlan<K>,
        prior: &impl PriorState<K>,
        key: &K,
        column: &str,
        timestamp: Option<i64>,
    ) {
        self.plan_columns_delete(plan, prior, key, &[column.to_string()], timestamp);
    }

    /// Plans deletion of several columns of one row.
    pub fn plan_columns_delete<K: RowKey>(
        &self,
        plan: &mut MutationPlan<K>,
        prior: &impl PriorState<K>,
        key: &K,
        columns: &[String],
        timestamp: Option<i64>,
    ) {
        let indexed: Vec<String> = columns
            .iter()
            .filter(|c| self.policy.is_value_indexed(c))
            .cloned()
            .collect();
        let old_values = self.read_prior(prior, key, PriorScope::Named(&indexed));

        for column in columns {
            self.plan_retractions(plan, key, column, old_values.get(column), timestamp);
            plan.push(PlannedOp::DeleteColumn {
                key: key.clone(),
                column: column.clone(),
                timestamp,
            });
        }
    }

    /// Plans deletion of a whole row, retracting it from every index
    /// entry it belongs to.
    pub fn plan_row_delete<K: RowKey>(
        &self,
        plan: &mut MutationPlan<K>,
        prior: &impl PriorState<K>,
        key: &K,
        timestamp: Option<i64>,
    ) {
        if self.policy.is_indexing_enabled() {
            // existence membership depends on which columns are present,
            // so the naming rule forces a whole-row read
            let value_columns: Vec<String> =
                self.policy.value_columns().map(str::to_string).collect();
            let scope = if self.policy.has_existence_indexes() {
                PriorScope::WholeRow
            } else {
                PriorScope::Named(&value_columns)
            };
            let current = self.read_prior(prior, key, scope);

            let mut names: Vec<&String> = current.keys().collect();
            names.sort();
            for column in names {
                self.plan_retractions(plan, key, column, current.get(column), timestamp);
            }
        }

        plan.push(PlannedOp::DeleteRow {
            key: key.clone(),
            timestamp,
        });
    }

    fn plan_retractions<K: RowKey>(
        &self,
        plan: &mut MutationPlan<K>,
        key: &K,
        column: &str,
        old_value: Option<&String>,
        timestamp: Option<i64>,
    ) {
        if self.policy.is_value_indexed(column) {
            if let Some(old) = old_value.filter(|v| !is_empty_value(Some(v.as_str()))) {
                plan.push(PlannedOp::Retract {
                    index_key: IndexKey::value(column, old),
                    member: key.clone(),
                    timestamp,
                });
            }
        }
        if self.policy.is_existence_indexed(column) {
            plan.push(PlannedOp::Retract {
                index_key: IndexKey::existence(column),
                member: key.clone(),
                timestamp,
            });
        }
    }

    fn read_prior<K>(
        &self,
        prior: &impl PriorState<K>,
        key: &K,
        scope: PriorScope<'_>,
    ) -> HashMap<String, String> {
        if matches!(scope, PriorScope::Named(names) if names.is_empty()) {
            return HashMap::new();
        }
        prior
            .prior_columns(key, scope)
            .into_iter()
            .map(|c| (c.name, c.value))
            .collect()
    }
}
