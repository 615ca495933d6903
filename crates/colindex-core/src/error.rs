//! Error types for `Colindex`.
//!
//! This module provides a unified error type for all index maintenance
//! operations. Caller input errors are raised before any storage call;
//! storage errors carry the stage of the logical write that failed.

use std::fmt;

use thiserror::Error;

/// Result type alias for `Colindex` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Stage of a logical write at which a batch submission failed.
///
/// Index batches are always submitted before the primary batch, so an
/// `Index` failure means the primary row was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    /// The index-table batch.
    Index,
    /// The primary-table batch.
    Primary,
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index => f.write_str("index"),
            Self::Primary => f.write_str("primary"),
        }
    }
}

/// Errors that can occur in `Colindex` operations.
///
/// Error codes follow the pattern `CIDX-XXX` for easy debugging.
#[derive(Error, Debug)]
pub enum Error {
    /// Row key rejected before reaching storage (CIDX-001).
    #[error("[CIDX-001] Invalid row key: {0}")]
    InvalidKey(String),

    /// Column name rejected before reaching storage (CIDX-002).
    #[error("[CIDX-002] Invalid column name: {0}")]
    InvalidColumn(String),

    /// Value cannot be canonicalised (CIDX-003).
    #[error("[CIDX-003] Invalid column value: {0}")]
    InvalidValue(String),

    /// Secondary query on a column without the matching index (CIDX-004).
    #[error("[CIDX-004] Column '{column}' has no {kind} index on table '{table}'")]
    NotIndexed {
        /// Primary table name.
        table: String,
        /// Column that was queried.
        column: String,
        /// Index kind that was required ("value" or "existence").
        kind: &'static str,
    },

    /// Connectivity or timeout failure reported by the gateway (CIDX-005).
    #[error("[CIDX-005] Transient storage error: {0}")]
    TransientStorage(String),

    /// Non-transient failure reported by the gateway (CIDX-006).
    #[error("[CIDX-006] Storage error: {0}")]
    Storage(String),

    /// A mutation batch was rejected (CIDX-007).
    #[error("[CIDX-007] {stage} batch for table '{table}' failed: {source}")]
    BatchFailed {
        /// Stage that failed.
        stage: BatchStage,
        /// Target table of the failed batch.
        table: String,
        /// Underlying gateway error.
        #[source]
        source: Box<Error>,
    },

    /// A stored string could not be read as the requested type (CIDX-008).
    #[error("[CIDX-008] Column '{column}' value '{value}' is not a valid {expected}")]
    Coercion {
        /// Column name.
        column: String,
        /// Stored string value.
        value: String,
        /// Requested type.
        expected: &'static str,
    },

    /// Configuration error (CIDX-009).
    #[error("[CIDX-009] Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns the error code (e.g., "CIDX-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "CIDX-001",
            Self::InvalidColumn(_) => "CIDX-002",
            Self::InvalidValue(_) => "CIDX-003",
            Self::NotIndexed { .. } => "CIDX-004",
            Self::TransientStorage(_) => "CIDX-005",
            Self::Storage(_) => "CIDX-006",
            Self::BatchFailed { .. } => "CIDX-007",
            Self::Coercion { .. } => "CIDX-008",
            Self::Config(_) => "CIDX-009",
        }
    }

    /// Returns true if the error was raised from caller input, before any
    /// storage call was made.
    #[must_use]
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey(_)
                | Self::InvalidColumn(_)
                | Self::InvalidValue(_)
                | Self::NotIndexed { .. }
        )
    }

    /// Returns true if the underlying storage failure is transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientStorage(_) => true,
            Self::BatchFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Returns the failing batch stage for failed writes.
    #[must_use]
    pub const fn stage(&self) -> Option<BatchStage> {
        match self {
            Self::BatchFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
