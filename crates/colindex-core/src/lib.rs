//! # `Colindex` Core
//!
//! Secondary-index maintenance for wide-column stores.
//!
//! Wide-column stores answer lookups by row key only. `Colindex` keeps a
//! derived index table next to each primary table so rows can also be
//! found by the value of a column, or by the mere presence of a column,
//! and keeps that index in step with every write and delete.
//!
//! ## Features
//!
//! - **Value indexes**: `(column, value) -> {row keys}`, retracted when a
//!   value is overwritten or deleted
//! - **Existence indexes**: `(column) -> {row keys}`, by explicit list or by
//!   a column naming rule
//! - **TTL propagation**: index pointers expire with the column they
//!   derive from
//! - **Ordered batches**: index mutations are submitted before the primary
//!   mutation, with one shared timestamp per logical write
//! - **Pluggable storage**: everything goes through [`StorageGateway`];
//!   [`InMemoryGateway`] is included
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use colindex_core::{IndexPolicy, IndexedTable, InMemoryGateway, WriteOptions};
//!
//! let policy = IndexPolicy::builder().value_column("status").build()?;
//! let users = IndexedTable::new(Arc::new(InMemoryGateway::<u64>::new()), "users", policy)?;
//!
//! users.update_string(&1, "status", "active", WriteOptions::new())?;
//! let active = users.retrieve_by_secondary_index("status", "active")?;
//! assert!(active.contains(&1));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// =============================================================================
// STYLISTIC LINTS - Safe to allow globally (no bug risk)
// =============================================================================
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod batch;
pub mod clock;
pub mod config;
#[cfg(test)]
mod config_tests;
pub mod error;
pub mod gateway;
pub mod key;
pub mod planner;
pub mod policy;
pub mod result;
pub mod table;
pub mod value;

pub use batch::{normalize_ttl, BatchAssembler, BatchReport, TimestampResolver};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ColindexConfig, ConfigError, IndexSection, TableIndexConfig};
pub use error::{BatchStage, Error, Result};
pub use gateway::{
    Column, ColumnSlice, GatewayOp, InMemoryGateway, IndexMutation, MutationBatch,
    PrimaryMutation, StorageGateway,
};
pub use key::RowKey;
pub use planner::{
    ColumnWrite, IndexMutationPlanner, MutationPlan, PlannedOp, PriorScope, PriorState,
    ReadBeforeWrite, Target,
};
pub use policy::{IndexKey, IndexPolicy, IndexPolicyBuilder, DEFAULT_INDEX_SUFFIX};
pub use result::{Lookup, Row, RowSet};
pub use table::{IndexedTable, RowUpdate, WriteOptions};
pub use value::{is_empty_value, ColumnValue, NULL_MARKER, TIMESTAMP_FORMAT};
