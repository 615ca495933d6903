//! Primary key types.
//!
//! Index tables store primary keys as their column names, so every key type
//! must encode to a string and decode back to the same key.

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::{Error, Result};

/// A primary row key usable with an indexed table.
pub trait RowKey: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static {
    /// Encodes the key as an index column name.
    fn encode(&self) -> String;

    /// Decodes a key previously produced by [`RowKey::encode`]. Gateways
    /// use it to turn stored index column names back into row keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if the string is not a valid encoding.
    fn decode(encoded: &str) -> Result<Self>;

    /// Rejects keys the store cannot address. Called before any storage
    /// access.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] when the key is unusable.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

impl RowKey for u64 {
    fn encode(&self) -> String {
        self.to_string()
    }

    fn decode(encoded: &str) -> Result<Self> {
        encoded
            .parse()
            .map_err(|_| Error::InvalidKey(format!("'{encoded}' is not a u64 key")))
    }
}

impl RowKey for i64 {
    fn encode(&self) -> String {
        self.to_string()
    }

    fn decode(encoded: &str) -> Result<Self> {
        encoded
            .parse()
            .map_err(|_| Error::InvalidKey(format!("'{encoded}' is not an i64 key")))
    }
}

impl RowKey for String {
    fn encode(&self) -> String {
        self.clone()
    }

    fn decode(encoded: &str) -> Result<Self> {
        Ok(encoded.to_string())
    }

    fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::InvalidKey("string key must not be empty".to_string()));
        }
        Ok(())
    }
}

impl RowKey for uuid::Uuid {
    fn encode(&self) -> String {
        self.hyphenated().to_string()
    }

    fn decode(encoded: &str) -> Result<Self> {
        uuid::Uuid::parse_str(encoded)
            .map_err(|e| Error::InvalidKey(format!("'{encoded}' is not a uuid key: {e}")))
    }

    fn validate(&self) -> Result<()> {
        if self.is_nil() {
            return Err(Error::InvalidKey("nil uuid is not a row key".to_string()));
        }
        Ok(())
    }
}

/// Validates a column name supplied by a caller.
pub(crate) fn validate_column(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidColumn("column name must not be empty".to_string()));
    }
    Ok(())
}
