//! `Colindex` Configuration Module
//!
//! Declares which columns of which tables are indexed, via `colindex.toml`
//! and environment variables.
//!
//! # Priority (highest to lowest)
//!
//! 1. Environment variables (`COLINDEX_*`, nested keys split on `__`)
//! 2. Configuration file (`colindex.toml`)
//! 3. Default values
//!
//! # Example
//!
//! ```toml
//! [index]
//! suffix = "_Secondary_Idx"
//!
//! [tables.users]
//! value_columns = ["status", "email"]
//! existence_pattern = "tag_.*"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::{IndexPolicy, DEFAULT_INDEX_SUFFIX};

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Index table naming section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    /// Suffix appended to a base table name to form its index table name.
    pub suffix: String,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_INDEX_SUFFIX.to_string(),
        }
    }
}

/// Index declaration for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableIndexConfig {
    /// Columns indexed by name and value.
    pub value_columns: Vec<String>,
    /// Columns indexed by name only.
    pub existence_columns: Vec<String>,
    /// Naming rule for existence-indexed columns, matched against the
    /// whole column name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existence_pattern: Option<String>,
    /// Explicit index table name, replacing `<table><suffix>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_table: Option<String>,
}

/// Main `Colindex` configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColindexConfig {
    /// Index table naming.
    pub index: IndexSection,
    /// Per-table index declarations.
    pub tables: BTreeMap<String, TableIndexConfig>,
}

impl ColindexConfig {
    /// Loads configuration from default sources.
    ///
    /// Priority: defaults < file < environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("colindex.toml")
    }

    /// Loads configuration from a specific file path. A missing file is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("COLINDEX_").split("__"));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty suffix, empty column names or an
    /// invalid existence pattern.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index.suffix.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "index.suffix".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        for (name, table) in &self.tables {
            if name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "tables".to_string(),
                    message: "table name must not be empty".to_string(),
                });
            }

            if table
                .value_columns
                .iter()
                .chain(&table.existence_columns)
                .any(String::is_empty)
            {
                return Err(ConfigError::InvalidValue {
                    key: format!("tables.{name}"),
                    message: "indexed column name must not be empty".to_string(),
                });
            }

            if let Some(pattern) = &table.existence_pattern {
                if let Err(e) = Regex::new(pattern) {
                    return Err(ConfigError::InvalidValue {
                        key: format!("tables.{name}.existence_pattern"),
                        message: format!("invalid pattern '{pattern}': {e}"),
                    });
                }
            }

            if table.index_table.as_deref() == Some("") {
                return Err(ConfigError::InvalidValue {
                    key: format!("tables.{name}.index_table"),
                    message: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Builds the index policy of `table`. Tables without a declaration
    /// get a policy with no indexed columns.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the declaration is invalid.
    pub fn policy_for(&self, table: &str) -> crate::Result<IndexPolicy> {
        let mut builder = IndexPolicy::builder().suffix(self.index.suffix.clone());

        if let Some(decl) = self.tables.get(table) {
            builder = builder
                .value_columns(decl.value_columns.iter().cloned())
                .existence_columns(decl.existence_columns.iter().cloned());
            if let Some(pattern) = &decl.existence_pattern {
                builder = builder.existence_pattern(pattern.clone());
            }
            if let Some(index_table) = &decl.index_table {
                builder = builder.index_table(index_table.clone());
            }
        }

        builder.build()
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
