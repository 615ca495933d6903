//! Tests for the mutation planner.

use super::*;
use crate::gateway::{InMemoryGateway, MutationBatch, PrimaryMutation};
use std::cell::RefCell;

/// Prior state backed by a fixed column map, counting reads.
#[derive(Default)]
struct FixedPrior {
    columns: Vec<Column>,
    reads: RefCell<Vec<String>>,
}

impl FixedPrior {
    fn with(columns: &[(&str, &str)]) -> Self {
        Self {
            columns: columns.iter().map(|(n, v)| Column::new(*n, *v)).collect(),
            reads: RefCell::default(),
        }
    }
}

impl PriorState<u64> for FixedPrior {
    fn prior_columns(&self, _key: &u64, scope: PriorScope<'_>) -> Vec<Column> {
        match scope {
            PriorScope::Named(names) => {
                self.reads.borrow_mut().push(names.join(","));
                self.columns
                    .iter()
                    .filter(|c| names.contains(&c.name))
                    .cloned()
                    .collect()
            }
            PriorScope::WholeRow => {
                self.reads.borrow_mut().push("*".to_string());
                self.columns.clone()
            }
        }
    }
}

fn policy() -> IndexPolicy {
    IndexPolicy::builder()
        .value_columns(["status", "email"])
        .existence_pattern("tag_.*")
        .build()
        .unwrap()
}

fn retract(column: &str, value: &str) -> PlannedOp<u64> {
    PlannedOp::Retract {
        index_key: IndexKey::value(column, value),
        member: 1,
        timestamp: None,
    }
}

fn insert(index_key: IndexKey) -> PlannedOp<u64> {
    PlannedOp::Insert {
        index_key,
        member: 1,
        ttl: None,
        timestamp: None,
    }
}

fn put(column: &str, value: &str) -> PlannedOp<u64> {
    PlannedOp::Put {
        key: 1,
        column: column.to_string(),
        value: value.to_string(),
        ttl: None,
        timestamp: None,
    }
}

#[test]
fn test_overwrite_retracts_old_and_inserts_new() {
    // Arrange
    let policy = policy();
    let planner = IndexMutationPlanner::new(&policy);
    let prior = FixedPrior::with(&[("status", "active")]);
    let mut plan = MutationPlan::new();

    // Act
    planner.plan_column_write(&mut plan, &prior, &1, &ColumnWrite::new("status", "inactive"));

    // Assert
    assert_eq!(
        plan.ops(),
        [
            retract("status", "active"),
            insert(IndexKey::value("status", "inactive")),
            put("status", "inactive"),
        ]
    );
}

#[test]
fn test_first_write_has_no_retraction() {
    let policy = policy();
    let planner = IndexMutationPlanner::new(&policy);
    let mut plan = MutationPlan::new();

    planner.plan_column_write(
        &mut plan,
        &FixedPrior::default(),
        &1,
        &ColumnWrite::new("status", "active"),
    );

    assert_eq!(
        plan.ops(),
        [
            insert(IndexKey::value("status", "active")),
            put("status", "active")
        ]
    );
}

#[test]
fn test_empty_values_are_never_indexed() {
    let policy = policy();
    let planner = IndexMutationPlanner::new(&policy);
    let prior = FixedPrior::with(&[("status", "null")]);
    let mut plan = MutationPlan::new();

    planner.plan_column_write(&mut plan, &prior, &1, &ColumnWrite::new("status", "  "));

    assert_eq!(plan.ops(), [put("status", "  ")]);
}

#[test]
fn test_same_value_rewrite_retracts_then_inserts() {
    let policy = policy();
    let planner = IndexMutationPlanner::new(&policy);
    let prior = FixedPrior::with(&[("status", "active")]);
    let mut plan = MutationPlan::new();

    planner.plan_column_write(&mut plan, &prior, &1, &ColumnWrite::new("status", "active"));

    assert_eq!(
        plan.ops(),
        [
            retract("status", "active"),
            insert(IndexKey::value("status", "active")),
            put("status", "active")
        ]
    );
}

#[test]
fn test_unindexed_column_skips_prior_read() {
    let policy = policy();
    let planner = IndexMutationPlanner::new(&policy);
    let prior = FixedPrior::default();
    let mut plan = MutationPlan::new();

    planner.plan_column_write(&mut plan, &prior, &1, &ColumnWrite::new("name", "bob"));

    assert_eq!(plan.ops(), [put("name", "bob")]);
    assert!(prior.reads.borrow().is_empty());
}

#[test]
fn test_existence_column_inserts_with_ttl() {
    let policy = policy();
    let planner = IndexMutationPlanner::new(&policy);
    let mut plan = MutationPlan::new();
    let write = ColumnWrite::new("tag_red", "x").with_ttl(Some(30));

    planner.plan_column_write(&mut plan, &FixedPrior::default(), &1, &write);

    assert_eq!(plan.len(), 2);
    assert_eq!(
        plan.ops()[0],
        PlannedOp::Insert {
            index_key: IndexKey::existence("tag_red"),
            member: 1,
            ttl: Some(30),
            timestamp: None,
        }
    );
}

#[test]
fn test_row_write_reads_prior_values_once() {
    let policy = policy();
    let planner = IndexMutationPlanner::new(&policy);
    let prior = FixedPrior::with(&[("status", "active"), ("email", "a@x")]);
    let mut plan = MutationPlan::new();
    let writes = [
        ColumnWrite::new("status", "inactive"),
        ColumnWrite::new("name", "bob"),
        ColumnWrite::new("email", "b@x"),
    ];

    planner.plan_row_write(&mut plan, &prior, &1, &writes);

    assert_eq!(*prior.reads.borrow(), ["status,email"]);
    assert_eq!(plan.ops_for(Target::Index).count(), 4);
    assert_eq!(plan.ops_for(Target::Primary).count(), 3);
}

#[test]
fn test_column_delete_retracts_value_and_existence() {
    let policy = IndexPolicy::builder()
        .value_column("tag_main")
        .existence_pattern("tag_.*")
        .build()
        .unwrap();
    let planner = IndexMutationPlanner::new(&policy);
    let prior = FixedPrior::with(&[("tag_main", "blue")]);
    let mut plan = MutationPlan::new();

    planner.plan_column_delete(&mut plan, &prior, &1, "tag_main", Some(50));

    assert_eq!(
        plan.ops(),
        [
            PlannedOp::Retract {
                index_key: IndexKey::value("tag_main", "blue"),
                member: 1,
                timestamp: Some(50),
            },
            PlannedOp::Retract {
                index_key: IndexKey::existence("tag_main"),
                member: 1,
                timestamp: Some(50),
            },
            PlannedOp::DeleteColumn {
                key: 1,
                column: "tag_main".to_string(),
                timestamp: Some(50),
            },
        ]
    );
}

#[test]
fn test_row_delete_retracts_every_membership() {
    let policy = policy();
    let planner = IndexMutationPlanner::new(&policy);
    let prior = FixedPrior::with(&[("status", "active"), ("name", "bob"), ("tag_red", "1")]);
    let mut plan = MutationPlan::new();

    planner.plan_row_delete(&mut plan, &prior, &1, None);

    // existence indexing forces a whole-row read
    assert_eq!(*prior.reads.borrow(), ["*"]);
    assert_eq!(
        plan.ops(),
        [
            retract("status", "active"),
            PlannedOp::Retract {
                index_key: IndexKey::existence("tag_red"),
                member: 1,
                timestamp: None,
            },
            PlannedOp::DeleteRow {
                key: 1,
                timestamp: None
            },
        ]
    );
}

#[test]
fn test_row_delete_without_indexing_skips_read() {
    let policy = IndexPolicy::none();
    let planner = IndexMutationPlanner::new(&policy);
    let prior = FixedPrior::with(&[("status", "active")]);
    let mut plan = MutationPlan::new();

    planner.plan_row_delete(&mut plan, &prior, &1, None);

    assert!(prior.reads.borrow().is_empty());
    assert_eq!(plan.len(), 1);
}

#[test]
fn test_read_before_write_degrades_on_failure() {
    let gateway = InMemoryGateway::<u64>::new();
    gateway
        .submit_batch(&MutationBatch::Primary {
            table: "users".to_string(),
            mutations: vec![PrimaryMutation::Put {
                key: 1,
                column: "status".to_string(),
                value: "active".to_string(),
                timestamp: Some(1),
                ttl: None,
            }],
        })
        .unwrap();
    let prior = ReadBeforeWrite::new(&gateway, "users");
    let names = ["status".to_string()];

    assert_eq!(prior.prior_columns(&1, PriorScope::Named(&names)).len(), 1);

    gateway.set_fail_reads(true);
    assert!(prior.prior_columns(&1, PriorScope::Named(&names)).is_empty());
}
