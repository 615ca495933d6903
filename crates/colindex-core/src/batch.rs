//! Batch assembly and submission.
//!
//! A [`MutationPlan`] is split into an index batch and a primary batch.
//! The index batch is submitted first: if it fails the primary row is
//! untouched, and if the primary batch fails afterwards the index may hold
//! a pointer to a value the row never received. Such a pointer is filtered
//! out by validated queries and fixed by the next write to the row.

use std::cell::OnceCell;
use std::marker::PhantomData;
use std::time::Instant;

use crate::clock::Clock;
use crate::error::{BatchStage, Error, Result};
use crate::gateway::{IndexMutation, MutationBatch, PrimaryMutation, StorageGateway};
use crate::key::RowKey;
use crate::planner::{MutationPlan, PlannedOp};

/// Converts a caller TTL into a store TTL. Zero and negative values mean
/// "no expiry".
#[must_use]
pub fn normalize_ttl(ttl: Option<i32>) -> Option<u32> {
    ttl.and_then(|t| u32::try_from(t).ok()).filter(|t| *t > 0)
}

/// Resolves mutation timestamps for one logical write.
///
/// Explicit positive timestamps are kept. All other mutations of the call
/// share a single clock reading, taken on first use.
pub struct TimestampResolver<'c> {
    clock: &'c dyn Clock,
    shared: OnceCell<i64>,
}

impl<'c> TimestampResolver<'c> {
    /// Creates a resolver reading `clock` at most once.
    #[must_use]
    pub fn new(clock: &'c dyn Clock) -> Self {
        Self {
            clock,
            shared: OnceCell::new(),
        }
    }

    /// Timestamp for a mutation with the given explicit value.
    pub fn resolve(&self, explicit: Option<i64>) -> i64 {
        match explicit {
            Some(ts) if ts > 0 => ts,
            _ => *self.shared.get_or_init(|| self.clock.now_micros()),
        }
    }

    /// The shared clock reading, if one was taken.
    #[must_use]
    pub fn shared(&self) -> Option<i64> {
        self.shared.get().copied()
    }
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchReport {
    /// Mutations submitted to the index table.
    pub index_mutations: usize,
    /// Mutations submitted to the primary table.
    pub primary_mutations: usize,
    /// Clock reading shared by mutations without explicit timestamps.
    pub timestamp: Option<i64>,
}

/// Turns plans into gateway batches and submits them, index first.
pub struct BatchAssembler<'a, K, G: ?Sized> {
    gateway: &'a G,
    clock: &'a dyn Clock,
    table: &'a str,
    index_table: &'a str,
    _key: PhantomData<fn(K)>,
}

impl<'a, K: RowKey, G: StorageGateway<K> + ?Sized> BatchAssembler<'a, K, G> {
    /// Creates an assembler for `table` and its index table.
    #[must_use]
    pub fn new(gateway: &'a G, clock: &'a dyn Clock, table: &'a str, index_table: &'a str) -> Self {
        Self {
            gateway,
            clock,
            table,
            index_table,
            _key: PhantomData,
        }
    }

    /// Submits `plan` as at most two batches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BatchFailed`] tagged with the failing stage. When
    /// the index stage fails the primary batch is not submitted.
    pub fn submit(&self, plan: MutationPlan<K>) -> Result<BatchReport> {
        tracing::trace!(table = self.table, ops = plan.len(), "submitting mutation plan");

        let (index, primary, timestamp) = self.assemble(plan);

        self.send(BatchStage::Index, &index)?;
        self.send(BatchStage::Primary, &primary)?;

        Ok(BatchReport {
            index_mutations: index.len(),
            primary_mutations: primary.len(),
            timestamp,
        })
    }

    fn assemble(
        &self,
        plan: MutationPlan<K>,
    ) -> (MutationBatch<K>, MutationBatch<K>, Option<i64>) {
        let resolver = TimestampResolver::new(self.clock);
        let mut index = Vec::new();
        let mut primary = Vec::new();

        for op in plan.into_ops() {
            match op {
                PlannedOp::Retract {
                    index_key,
                    member,
                    timestamp,
                } => index.push(IndexMutation::Retract {
                    index_key,
                    member,
                    timestamp: Some(resolver.resolve(timestamp)),
                }),
                PlannedOp::Insert {
                    index_key,
                    member,
                    ttl,
                    timestamp,
                } => index.push(IndexMutation::Insert {
                    index_key,
                    member,
                    timestamp: Some(resolver.resolve(timestamp)),
                    ttl: normalize_ttl(ttl),
                }),
                PlannedOp::Put {
                    key,
                    column,
                    value,
                    ttl,
                    timestamp,
                } => primary.push(PrimaryMutation::Put {
                    key,
                    column,
                    value,
                    timestamp: Some(resolver.resolve(timestamp)),
                    ttl: normalize_ttl(ttl),
                }),
                PlannedOp::DeleteColumn {
                    key,
                    column,
                    timestamp,
                } => primary.push(PrimaryMutation::DeleteColumn {
                    key,
                    column,
                    timestamp: Some(resolver.resolve(timestamp)),
                }),
                PlannedOp::DeleteRow { key, timestamp } => {
                    primary.push(PrimaryMutation::DeleteRow {
                        key,
                        timestamp: Some(resolver.resolve(timestamp)),
                    });
                }
            }
        }

        (
            MutationBatch::Index {
                table: self.index_table.to_string(),
                mutations: index,
            },
            MutationBatch::Primary {
                table: self.table.to_string(),
                mutations: primary,
            },
            resolver.shared(),
        )
    }

    fn send(&self, stage: BatchStage, batch: &MutationBatch<K>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let result = self.gateway.submit_batch(batch);
        let elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);

        match result {
            Ok(()) => {
                tracing::debug!(
                    table = batch.table(),
                    %stage,
                    mutations = batch.len(),
                    elapsed_us,
                    "batch submitted"
                );
                Ok(())
            }
            Err(source) => {
                tracing::warn!(
                    table = batch.table(),
                    %stage,
                    mutations = batch.len(),
                    elapsed_us,
                    error = %source,
                    "batch rejected"
                );
                Err(Error::BatchFailed {
                    stage,
                    table: batch.table().to_string(),
                    source: Box::new(source),
                })
            }
        }
    }
}
