//! Tests for config module

#[cfg(test)]
mod tests {
    use crate::config::*;
    use serial_test::serial;
    use std::io::Write;

    const USERS_TOML: &str = r#"
[index]
suffix = "_idx"

[tables.users]
value_columns = ["status", "email"]
existence_columns = ["archived"]
existence_pattern = "tag_.*"
"#;

    // ========================================================================
    // Defaults
    // ========================================================================

    #[test]
    fn test_config_default_values() {
        // Arrange & Act
        let config = ColindexConfig::default();

        // Assert
        assert_eq!(config.index.suffix, "_Secondary_Idx");
        assert!(config.tables.is_empty());
        assert!(config.validate().is_ok());
    }

    // ========================================================================
    // Parsing
    // ========================================================================

    #[test]
    fn test_config_from_toml() {
        // Arrange & Act
        let config = ColindexConfig::from_toml(USERS_TOML).expect("parse");

        // Assert
        assert_eq!(config.index.suffix, "_idx");
        let users = &config.tables["users"];
        assert_eq!(users.value_columns, ["status", "email"]);
        assert_eq!(users.existence_columns, ["archived"]);
        assert_eq!(users.existence_pattern.as_deref(), Some("tag_.*"));
        assert!(users.index_table.is_none());
    }

    #[test]
    fn test_config_partial_toml_keeps_defaults() {
        // Arrange & Act
        let config = ColindexConfig::from_toml("[tables.orders]\nvalue_columns = [\"state\"]")
            .expect("parse");

        // Assert
        assert_eq!(config.index.suffix, "_Secondary_Idx");
        assert_eq!(config.tables["orders"].value_columns, ["state"]);
    }

    #[test]
    fn test_config_invalid_toml() {
        let result = ColindexConfig::from_toml("[tables.users\nvalue_columns = 3");

        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    // ========================================================================
    // Validation
    // ========================================================================

    #[test]
    fn test_validate_rejects_empty_suffix() {
        // Arrange
        let mut config = ColindexConfig::default();
        config.index.suffix = String::new();

        // Act
        let result = config.validate();

        // Assert
        match result {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "index.suffix"),
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_empty_column_name() {
        let config =
            ColindexConfig::from_toml("[tables.users]\nvalue_columns = [\"\"]").expect("parse");

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let config = ColindexConfig::from_toml("[tables.users]\nexistence_pattern = \"tag_(\"")
            .expect("parse");

        match config.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => {
                assert_eq!(key, "tables.users.existence_pattern");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    // ========================================================================
    // Policies
    // ========================================================================

    #[test]
    fn test_policy_for_declared_table() {
        // Arrange
        let config = ColindexConfig::from_toml(USERS_TOML).expect("parse");

        // Act
        let policy = config.policy_for("users").expect("policy");

        // Assert
        assert!(policy.is_value_indexed("status"));
        assert!(policy.is_existence_indexed("archived"));
        assert!(policy.is_existence_indexed("tag_blue"));
        assert_eq!(policy.index_table_name("users"), "users_idx");
    }

    #[test]
    fn test_policy_for_undeclared_table_indexes_nothing() {
        let config = ColindexConfig::from_toml(USERS_TOML).expect("parse");

        let policy = config.policy_for("orders").expect("policy");

        assert!(!policy.is_indexing_enabled());
        assert_eq!(policy.index_table_name("orders"), "orders_idx");
    }

    #[test]
    fn test_policy_for_index_table_override() {
        let config = ColindexConfig::from_toml(
            "[tables.users]\nvalue_columns = [\"status\"]\nindex_table = \"user_lookup\"",
        )
        .expect("parse");

        let policy = config.policy_for("users").expect("policy");

        assert_eq!(policy.index_table_name("users"), "user_lookup");
    }

    // ========================================================================
    // Loading
    // ========================================================================

    #[test]
    #[serial]
    fn test_load_from_path_reads_file() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("colindex.toml");
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(USERS_TOML.as_bytes()).expect("write");

        // Act
        let config = ColindexConfig::load_from_path(&path).expect("load");

        // Assert
        assert_eq!(config.index.suffix, "_idx");
        assert!(config.tables.contains_key("users"));
    }

    #[test]
    #[serial]
    fn test_load_from_missing_path_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");

        let config = ColindexConfig::load_from_path(dir.path().join("absent.toml")).expect("load");

        assert_eq!(config, ColindexConfig::default());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("colindex.toml");
        std::fs::write(&path, USERS_TOML).expect("write");
        std::env::set_var("COLINDEX_INDEX__SUFFIX", "_from_env");

        // Act
        let config = ColindexConfig::load_from_path(&path);
        std::env::remove_var("COLINDEX_INDEX__SUFFIX");

        // Assert
        let config = config.expect("load");
        assert_eq!(config.index.suffix, "_from_env");
        assert_eq!(config.tables["users"].value_columns, ["status", "email"]);
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    #[test]
    fn test_config_roundtrip() {
        // Arrange
        let config = ColindexConfig::from_toml(USERS_TOML).expect("parse");

        // Act
        let toml_str = config.to_toml().expect("serialize");
        let parsed = ColindexConfig::from_toml(&toml_str).expect("parse");

        // Assert
        assert!(toml_str.contains("[tables.users]"));
        assert_eq!(parsed, config);
    }
}
