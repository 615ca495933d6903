//! Mutation plans produced by the planner and consumed by the batch
//! assembler.

use crate::policy::IndexKey;

/// Table family an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The primary table.
    Primary,
    /// The index table.
    Index,
}

/// One planned storage operation.
///
/// Timestamps are the caller's explicit values (`None` when not given);
/// TTLs are raw caller values. The batch assembler resolves both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedOp<K> {
    /// Remove `member` from the index entry `index_key`.
    Retract {
        /// Entry holding the stale pointer.
        index_key: IndexKey,
        /// Primary key to remove.
        member: K,
        /// Explicit timestamp of the originating column.
        timestamp: Option<i64>,
    },
    /// Add `member` to the index entry `index_key`.
    Insert {
        /// Entry to add to.
        index_key: IndexKey,
        /// Primary key to add.
        member: K,
        /// TTL of the originating column.
        ttl: Option<i32>,
        /// Explicit timestamp of the originating column.
        timestamp: Option<i64>,
    },
    /// Write a primary column.
    Put {
        /// Row key.
        key: K,
        /// Column name.
        column: String,
        /// Canonical value.
        value: String,
        /// Column TTL.
        ttl: Option<i32>,
        /// Explicit column timestamp.
        timestamp: Option<i64>,
    },
    /// Delete a primary column.
    DeleteColumn {
        /// Row key.
        key: K,
        /// Column name.
        column: String,
        /// Explicit timestamp.
        timestamp: Option<i64>,
    },
    /// Delete a primary row.
    DeleteRow {
        /// Row key.
        key: K,
        /// Explicit timestamp.
        timestamp: Option<i64>,
    },
}

impl<K> PlannedOp<K> {
    /// Table family this operation targets.
    #[must_use]
    pub const fn target(&self) -> Target {
        match self {
            Self::Retract { .. } | Self::Insert { .. } => Target::Index,
            Self::Put { .. } | Self::DeleteColumn { .. } | Self::DeleteRow { .. } => {
                Target::Primary
            }
        }
    }

    /// Index entry touched, for index operations.
    #[must_use]
    pub fn index_key(&self) -> Option<&IndexKey> {
        match self {
            Self::Retract { index_key, .. } | Self::Insert { index_key, .. } => Some(index_key),
            _ => None,
        }
    }
}

/// Ordered operations for one logical write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationPlan<K> {
    ops: Vec<PlannedOp<K>>,
}

impl<K> MutationPlan<K> {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Appends an operation.
    pub fn push(&mut self, op: PlannedOp<K>) {
        self.ops.push(op);
    }

    /// Operations in plan order.
    #[must_use]
    pub fn ops(&self) -> &[PlannedOp<K>] {
        &self.ops
    }

    /// Consumes the plan.
    #[must_use]
    pub fn into_ops(self) -> Vec<PlannedOp<K>> {
        self.ops
    }

    /// Operations on the given target, in plan order.
    pub fn ops_for(&self, target: Target) -> impl Iterator<Item = &PlannedOp<K>> {
        self.ops.iter().filter(move |op| op.target() == target)
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing was planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl<K> Default for MutationPlan<K> {
    fn default() -> Self {
        Self::new()
    }
}
