//! End-to-end index maintenance through `IndexedTable`.
//!
//! Every test runs against the in-memory gateway, which applies batches
//! with the same last-write-wins and TTL rules as a wide-column store.

use std::collections::BTreeSet;
use std::sync::Arc;

use colindex_core::{
    ColindexConfig, ColumnSlice, ColumnValue, GatewayOp, InMemoryGateway, IndexKey, IndexPolicy,
    IndexedTable, Lookup, ManualClock, RowUpdate, WriteOptions,
};

type Users = IndexedTable<u64, InMemoryGateway<u64>>;

fn users() -> Users {
    let policy = IndexPolicy::builder()
        .value_columns(["status", "email"])
        .existence_column("archived")
        .existence_pattern("tag_.*")
        .build()
        .expect("policy");
    IndexedTable::new(Arc::new(InMemoryGateway::new()), "users", policy).expect("table")
}

fn keys(items: &[u64]) -> BTreeSet<u64> {
    items.iter().copied().collect()
}

#[test]
fn test_status_lifecycle() {
    // Arrange
    let table = users();

    // Act & Assert: first write
    table
        .update_string(&1, "status", "active", WriteOptions::new())
        .expect("write");
    assert_eq!(
        table.keys_by_secondary_index("status", "active").unwrap(),
        keys(&[1])
    );

    // overwrite moves the pointer
    table
        .update_string(&1, "status", "inactive", WriteOptions::new())
        .expect("overwrite");
    assert!(table
        .keys_by_secondary_index("status", "active")
        .unwrap()
        .is_empty());
    assert_eq!(
        table.keys_by_secondary_index("status", "inactive").unwrap(),
        keys(&[1])
    );

    // row delete clears every membership
    table.delete_row(&1, None).expect("delete");
    assert!(table
        .keys_by_secondary_index("status", "active")
        .unwrap()
        .is_empty());
    assert!(table
        .keys_by_secondary_index("status", "inactive")
        .unwrap()
        .is_empty());
    assert!(table.read_row(&1).unwrap().is_none());
}

#[test]
fn test_row_update_shares_one_timestamp() {
    let table = users();

    table
        .update_row(&1, &RowUpdate::new().set("a", "1").set("b", "2"))
        .expect("update");

    let a = table.read_column(&1, "a").unwrap().expect("a");
    let b = table.read_column(&1, "b").unwrap().expect("b");
    assert!(a.timestamp.is_some());
    assert_eq!(a.timestamp, b.timestamp);
}

#[test]
fn test_row_update_keeps_explicit_timestamps() {
    let table = users();
    let update = RowUpdate::new()
        .set("a", "1")
        .set_with("b", "2", WriteOptions::new().with_timestamp(77))
        .set("c", "3");

    table.update_row(&1, &update).expect("update");

    let ts = |c: &str| table.read_column(&1, c).unwrap().unwrap().timestamp;
    assert_eq!(ts("b"), Some(77));
    assert_eq!(ts("a"), ts("c"));
    assert_ne!(ts("a"), Some(77));
}

#[test]
fn test_ttl_propagates_to_index_pointer() {
    // Arrange
    let clock = Arc::new(ManualClock::default());
    let gateway = Arc::new(InMemoryGateway::<u64>::with_clock(clock.clone()));
    let policy = IndexPolicy::builder()
        .value_column("session")
        .build()
        .unwrap();
    let table = IndexedTable::new(gateway.clone(), "users", policy)
        .unwrap()
        .with_clock(clock.clone());

    // Act
    table
        .update_string(&1, "session", "abc", WriteOptions::new().with_ttl(10))
        .unwrap();

    // Assert
    let index_key = IndexKey::value("session", "abc");
    assert_eq!(
        gateway.index_member_ttl(table.index_table(), &index_key, &1),
        Some(10)
    );
    assert_eq!(table.read_column(&1, "session").unwrap().unwrap().ttl, Some(10));

    clock.advance_secs(10);
    assert!(table.read_string(&1, "session").unwrap().is_none());
    assert!(table
        .keys_by_secondary_index("session", "abc")
        .unwrap()
        .is_empty());
}

#[test]
fn test_non_positive_ttl_means_no_expiry() {
    let clock = Arc::new(ManualClock::default());
    let gateway = Arc::new(InMemoryGateway::<u64>::with_clock(clock.clone()));
    let policy = IndexPolicy::builder().value_column("status").build().unwrap();
    let table = IndexedTable::new(gateway.clone(), "users", policy)
        .unwrap()
        .with_clock(clock.clone());

    table
        .update_string(&1, "status", "active", WriteOptions::new().with_ttl(0))
        .unwrap();
    table
        .update_string(&2, "status", "active", WriteOptions::new().with_ttl(-3))
        .unwrap();
    clock.advance_secs(3600);

    assert_eq!(
        table.keys_by_secondary_index("status", "active").unwrap(),
        keys(&[1, 2])
    );
    assert_eq!(table.read_column(&1, "status").unwrap().unwrap().ttl, None);
}

#[test]
fn test_multi_value_query_is_one_fan_out() {
    // Arrange
    let table = users();
    for (key, status) in [(1, "active"), (2, "inactive"), (3, "pending"), (4, "active")] {
        table
            .update_string(&key, "status", status, WriteOptions::new())
            .unwrap();
    }
    table.gateway().clear_operations();

    // Act
    let rows = table
        .retrieve_by_secondary_index_values("status", ["active", "inactive", "active"])
        .unwrap();

    // Assert
    assert_eq!(rows.keys().copied().collect::<BTreeSet<_>>(), keys(&[1, 2, 4]));
    assert_eq!(
        table.gateway().operations(),
        vec![
            GatewayOp::IndexRead {
                table: "users_Secondary_Idx".to_string(),
                entries: 2
            },
            GatewayOp::Read {
                table: "users".to_string(),
                rows: 3
            },
        ]
    );
}

#[test]
fn test_query_without_matches_skips_primary_read() {
    let table = users();
    table.gateway().clear_operations();

    let rows = table.retrieve_by_secondary_index("status", "ghost").unwrap();

    assert!(rows.is_empty());
    assert_eq!(table.gateway().operations().len(), 1);
}

#[test]
fn test_existence_index_tracks_presence() {
    let table = users();

    table
        .update_string(&1, "tag_red", "x", WriteOptions::new())
        .unwrap();
    table
        .update_string(&2, "archived", "yes", WriteOptions::new())
        .unwrap();
    assert_eq!(table.keys_by_existence_index("tag_red").unwrap(), keys(&[1]));
    assert_eq!(
        table
            .retrieve_by_existence_index("archived")
            .unwrap()
            .keys()
            .copied()
            .collect::<Vec<_>>(),
        [2]
    );

    table.delete_column(&1, "tag_red", None).unwrap();
    assert!(table.keys_by_existence_index("tag_red").unwrap().is_empty());
}

#[test]
fn test_delete_columns_is_one_logical_operation() {
    let table = users();
    table
        .update_row(
            &1,
            &RowUpdate::new()
                .set("status", "active")
                .set("email", "a@example.com")
                .set("name", "Ann"),
        )
        .unwrap();
    table.gateway().clear_operations();

    table.delete_columns(&1, &["status", "email"], None).unwrap();

    let ops = table.gateway().operations();
    // one prior read, then index batch, then primary batch
    assert_eq!(ops.len(), 3);
    assert!(table
        .keys_by_secondary_index("email", "a@example.com")
        .unwrap()
        .is_empty());
    let row = table.read_row(&1).unwrap().expect("row");
    assert_eq!(row.column_names().collect::<Vec<_>>(), ["name"]);
}

#[test]
fn test_rewriting_same_value_is_idempotent() {
    let table = users();

    for _ in 0..2 {
        table
            .update_string(&1, "status", "active", WriteOptions::new())
            .unwrap();
    }

    assert_eq!(
        table.keys_by_secondary_index("status", "active").unwrap(),
        keys(&[1])
    );
}

#[test]
fn test_empty_values_stay_out_of_the_index() {
    let table = users();

    table
        .update_value(&1, "status", ColumnValue::Null, WriteOptions::new())
        .unwrap();
    table
        .update_string(&1, "status", "active", WriteOptions::new())
        .unwrap();

    assert!(table
        .keys_by_secondary_index("status", "null")
        .unwrap()
        .is_empty());
    assert_eq!(
        table.keys_by_secondary_index("status", "active").unwrap(),
        keys(&[1])
    );
}

#[test]
fn test_typed_values_use_canonical_strings() {
    let table = IndexedTable::new(
        Arc::new(InMemoryGateway::<u64>::new()),
        "scores",
        IndexPolicy::builder().value_column("level").build().unwrap(),
    )
    .unwrap();

    table
        .update_value(&1, "level", 3_i64, WriteOptions::new())
        .unwrap();
    table
        .update_value(&2, "level", 3.0_f64, WriteOptions::new())
        .unwrap();

    assert_eq!(table.read_string(&1, "level").unwrap().as_deref(), Some("3"));
    assert_eq!(
        table.keys_by_secondary_index("level", 3_i64).unwrap(),
        keys(&[1])
    );
    assert_eq!(
        table.keys_by_secondary_index("level", 3.0_f64).unwrap(),
        keys(&[2])
    );
    assert_eq!(
        table
            .read_row(&1)
            .unwrap()
            .unwrap()
            .get_i64("level")
            .unwrap(),
        Some(3)
    );
}

#[test]
fn test_validated_query_drops_stale_pointers() {
    // Arrange: an index pointer survives while the primary row moved on
    let table = users();
    table
        .update_string(&1, "status", "active", WriteOptions::new())
        .unwrap();
    table.gateway().set_fail_reads(true);
    // the prior read fails, so "active" is never retracted
    table
        .update_string(&1, "status", "inactive", WriteOptions::new())
        .unwrap();
    table.gateway().set_fail_reads(false);

    // Act
    let raw = table.retrieve_by_secondary_index("status", "active").unwrap();
    let validated = table
        .retrieve_by_secondary_index_validated("status", "active")
        .unwrap();

    // Assert
    assert_eq!(raw.len(), 1);
    assert!(validated.is_empty());
}

#[test]
fn test_reads_distinguish_missing_row_and_column() {
    let table = users();
    table
        .update_string(&1, "name", "Ann", WriteOptions::new())
        .unwrap();

    let rows = table.read_rows(&[1, 2]).unwrap();

    assert_eq!(rows.lookup(&2, "name"), Lookup::RowNotFound);
    assert_eq!(rows.lookup(&1, "email"), Lookup::ColumnMissing);
    assert!(matches!(rows.lookup(&1, "name"), Lookup::Found(c) if c.value == "Ann"));
}

#[test]
fn test_named_read_distinguishes_missing_row_and_column() {
    let table = users();
    table
        .update_string(&1, "other", "x", WriteOptions::new())
        .unwrap();

    let present = table.read_columns(&1, &["score"]).unwrap();
    let absent = table.read_columns(&2, &["score"]).unwrap();

    assert_eq!(present.map(|row| row.len()), Some(0));
    assert!(absent.is_none());
}

#[test]
fn test_rows_slice_over_several_keys() {
    // Arrange
    let table = users();
    let update = ["a", "b", "c", "d"]
        .iter()
        .fold(RowUpdate::new(), |u, c| u.set(*c, *c));
    table.update_row(&1, &update).unwrap();
    table.update_row(&2, &RowUpdate::new().set("b", "x").set("d", "y")).unwrap();
    table.update_string(&3, "z", "z", WriteOptions::new()).unwrap();

    // Act
    let rows = table
        .read_rows_slice(&[1, 2, 3, 4], &ColumnSlice::range("d", "b", 2).reversed())
        .unwrap();

    // Assert
    assert_eq!(rows.keys().copied().collect::<Vec<_>>(), [1, 2]);
    let names = |key: u64| {
        rows.row(&key)
            .map(|r| r.column_names().map(str::to_string).collect::<Vec<_>>())
            .unwrap_or_default()
    };
    assert_eq!(names(1), ["d", "c"]);
    assert_eq!(names(2), ["d", "b"]);
    assert_eq!(rows.lookup(&3, "z"), Lookup::RowNotFound);
}

#[test]
fn test_named_columns_and_slices() {
    let table = users();
    let update = ["a", "b", "c", "d"]
        .iter()
        .fold(RowUpdate::new(), |u, c| u.set(*c, c.to_uppercase()));
    table.update_row(&1, &update).unwrap();
    table.update_string(&2, "b", "x", WriteOptions::new()).unwrap();

    let named = table.read_columns(&1, &["b", "z"]).unwrap().expect("row 1");
    assert_eq!(named.len(), 1);

    let slice = table
        .read_slice(&1, &ColumnSlice::range("c", "a", 2).reversed())
        .unwrap();
    assert_eq!(slice.column_names().collect::<Vec<_>>(), ["c", "b"]);

    let both = table.read_rows_columns(&[1, 2], &["b"]).unwrap();
    assert_eq!(both.len(), 2);
    assert_eq!(both.row(&2).and_then(|r| r.get_str("b")), Some("x"));
}

#[test]
fn test_counters_never_touch_indexes() {
    let policy = IndexPolicy::builder().value_column("views").build().unwrap();
    let table =
        IndexedTable::new(Arc::new(InMemoryGateway::<u64>::new()), "pages", policy).unwrap();

    assert_eq!(table.get_counter_value(&1, "views").unwrap(), 0);
    table.increment_counter(&1, "views").unwrap();
    table.increment_counter(&1, "views").unwrap();
    table.update_counter(&1, "views", 10).unwrap();
    table.decrement_counter(&1, "views").unwrap();

    assert_eq!(table.get_counter_value(&1, "views").unwrap(), 11);
    assert!(table
        .gateway()
        .operations()
        .iter()
        .all(|op| !matches!(op, GatewayOp::Batch { .. })));
}

#[test]
fn test_from_config_builds_policy() {
    let config = ColindexConfig::from_toml(
        "[index]\nsuffix = \"_ix\"\n\n[tables.users]\nvalue_columns = [\"status\"]",
    )
    .unwrap();

    let table: Users =
        IndexedTable::from_config(Arc::new(InMemoryGateway::new()), "users", &config).unwrap();
    table
        .update_string(&5, "status", "active", WriteOptions::new())
        .unwrap();

    assert_eq!(table.index_table(), "users_ix");
    assert_eq!(
        table.keys_by_secondary_index("status", "active").unwrap(),
        keys(&[5])
    );
}

#[test]
fn test_string_and_uuid_keys() {
    let policy = IndexPolicy::builder().value_column("status").build().unwrap();
    let by_name = IndexedTable::new(
        Arc::new(InMemoryGateway::<String>::new()),
        "accounts",
        policy.clone(),
    )
    .unwrap();
    by_name
        .update_string(&"alice".to_string(), "status", "active", WriteOptions::new())
        .unwrap();
    assert!(by_name
        .retrieve_by_secondary_index("status", "active")
        .unwrap()
        .contains(&"alice".to_string()));

    let by_id = IndexedTable::new(
        Arc::new(InMemoryGateway::<uuid::Uuid>::new()),
        "devices",
        policy,
    )
    .unwrap();
    let id = uuid::Uuid::new_v4();
    by_id
        .update_string(&id, "status", "online", WriteOptions::new())
        .unwrap();
    assert_eq!(
        by_id.keys_by_secondary_index("status", "online").unwrap(),
        BTreeSet::from([id])
    );
}
