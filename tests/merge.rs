mod common;

use common::*;
use proptest::prelude::*;
use shardgate::merge::{
    EncryptColumn, EncryptRule, MemoryQueryResult, Sha256AssistedQueryAlgorithm,
};
use shardgate::statement::{
    AggregationKind, AggregationProjection, DalKind, OrderByItem, StatementKind,
};
use shardgate::{Error, MergeEngine, QueryResult, ShardingProps, ShardingRuntime, StatementShape, Value};
use std::sync::Arc;

fn engine() -> MergeEngine {
    MergeEngine::new(Arc::new(order_rule()))
}

fn ints(values: Vec<Value>) -> Vec<i64> {
    values.iter().filter_map(Value::as_i64).collect()
}

fn order_by_id() -> StatementShape {
    StatementShape::select("SELECT id FROM t_order ORDER BY id")
        .with_tables(&["t_order"])
        .with_order_by(vec![OrderByItem::asc(0)])
}

#[test]
fn test_order_by_interleaves_shards() {
    let mut merged = engine()
        .merge(
            vec![int_shard(&[2]), int_shard(&[2, 3, 4]), int_shard(&[1, 3])],
            &order_by_id(),
        )
        .unwrap();
    assert_eq!(ints(drain_column(merged.as_mut(), 0)), vec![1, 2, 2, 3, 3, 4]);
}

#[test]
fn test_order_by_with_offset_and_limit() {
    let statement = order_by_id().with_pagination(1, Some(2));
    let mut merged = engine()
        .merge(
            vec![int_shard(&[2]), int_shard(&[2, 3, 4]), int_shard(&[1, 3])],
            &statement,
        )
        .unwrap();
    assert_eq!(ints(drain_column(merged.as_mut(), 0)), vec![2, 2]);
}

#[test]
fn test_descending_order_with_empty_shard() {
    let statement = StatementShape::select("SELECT id FROM t_order ORDER BY id DESC")
        .with_order_by(vec![OrderByItem::desc(0)]);
    let mut merged = engine()
        .merge(vec![int_shard(&[9, 5]), int_shard(&[]), int_shard(&[7, 1])], &statement)
        .unwrap();
    assert_eq!(ints(drain_column(merged.as_mut(), 0)), vec![9, 7, 5, 1]);
}

#[test]
fn test_all_shards_empty() {
    let mut merged = engine()
        .merge(vec![int_shard(&[]), int_shard(&[])], &order_by_id())
        .unwrap();
    assert!(!merged.next().unwrap());
    assert!(!merged.next().unwrap());
}

#[test]
fn test_plain_select_concatenates_in_shard_order() {
    let statement = StatementShape::select("SELECT id FROM t_order").with_tables(&["t_order"]);
    let mut merged = engine()
        .merge(vec![int_shard(&[3, 1]), int_shard(&[2])], &statement)
        .unwrap();
    assert_eq!(ints(drain_column(merged.as_mut(), 0)), vec![3, 1, 2]);
}

#[test]
fn test_avg_recombined_from_sum_and_count() {
    // AVG(price), COUNT(price) AS derived, SUM(price) AS derived
    let statement = StatementShape::select("SELECT AVG(price) FROM t_order")
        .with_tables(&["t_order"])
        .with_aggregations(vec![AggregationProjection::avg(0, 1, 2)]);
    let labels = ["avg", "count", "sum"];
    let first = shard(&labels, vec![vec![Value::Float(5.0), Value::Int(2), Value::Int(10)]]);
    let second = shard(
        &labels,
        vec![vec![Value::Float(20.0 / 3.0), Value::Int(3), Value::Int(20)]],
    );
    let mut merged = engine()
        .merge(vec![Box::new(first), Box::new(second)], &statement)
        .unwrap();
    assert!(merged.next().unwrap());
    assert_eq!(merged.value(0).unwrap(), Value::Float(6.0));
    assert_eq!(merged.value(1).unwrap(), Value::Int(5));
    assert_eq!(merged.value(2).unwrap(), Value::Int(30));
    assert!(!merged.next().unwrap());
}

#[test]
fn test_group_by_sum_across_shards() {
    let statement = StatementShape::select("SELECT status, SUM(amount) FROM t_order GROUP BY status")
        .with_tables(&["t_order"])
        .with_group_by(vec![OrderByItem::asc(0)])
        .with_aggregations(vec![AggregationProjection::new(AggregationKind::Sum, 1)]);
    let labels = ["status", "amount"];
    let row = |s: &str, v: i64| vec![Value::from(s), Value::Int(v)];
    let first = shard(&labels, vec![row("new", 1), row("paid", 5)]);
    let second = shard(&labels, vec![row("done", 7), row("new", 2)]);
    let mut merged = engine()
        .merge(vec![Box::new(first), Box::new(second)], &statement)
        .unwrap();

    let mut groups = Vec::new();
    while merged.next().unwrap() {
        groups.push((merged.value(0).unwrap(), merged.value(1).unwrap()));
    }
    assert_eq!(
        groups,
        vec![
            (Value::from("done"), Value::Int(7)),
            (Value::from("new"), Value::Int(3)),
            (Value::from("paid"), Value::Int(5)),
        ]
    );
}

#[test]
fn test_count_over_empty_shards_is_zero() {
    let statement = StatementShape::select("SELECT COUNT(*) FROM t_order")
        .with_tables(&["t_order"])
        .with_aggregations(vec![AggregationProjection::new(AggregationKind::Count, 0)]);
    let mut merged = engine()
        .merge(
            vec![Box::new(shard(&["count"], vec![])), Box::new(shard(&["count"], vec![]))],
            &statement,
        )
        .unwrap();
    assert!(merged.next().unwrap());
    assert_eq!(merged.value(0).unwrap(), Value::Int(0));
    assert!(!merged.next().unwrap());
}

#[test]
fn test_sum_over_text_is_a_type_error() {
    let statement = StatementShape::select("SELECT SUM(name) FROM t_order")
        .with_aggregations(vec![AggregationProjection::new(AggregationKind::Sum, 0)]);
    let result = engine()
        .merge(
            vec![
                Box::new(shard(&["sum"], vec![vec![Value::from("x")]])),
                Box::new(shard(&["sum"], vec![vec![Value::Int(1)]])),
            ],
            &statement,
        )
        .and_then(|mut merged| merged.next());
    assert!(matches!(result, Err(Error::AggregationType { .. })));
}

#[test]
fn test_limit_closes_every_shard_exactly_once() {
    let shards: Vec<MemoryQueryResult> = (0..3)
        .map(|i| shard(&["id"], (0..5).map(|v| vec![Value::Int(v * 3 + i)]).collect()))
        .collect();
    let counters: Vec<_> = shards.iter().map(MemoryQueryResult::close_counter).collect();
    let results: Vec<Box<dyn QueryResult>> = shards
        .into_iter()
        .map(|s| Box::new(s) as Box<dyn QueryResult>)
        .collect();

    let statement = order_by_id().with_pagination(0, Some(2));
    let mut merged = engine().merge(results, &statement).unwrap();
    assert_eq!(ints(drain_column(merged.as_mut(), 0)), vec![0, 1]);
    merged.close().unwrap();
    drop(merged);

    for counter in counters {
        assert_eq!(counter.get(), 1);
    }
}

#[test]
fn test_dropping_unfinished_merge_closes_shards() {
    let first = shard(&["id"], vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
    let second = shard(&["id"], vec![vec![Value::Int(3)]]);
    let counters = [first.close_counter(), second.close_counter()];
    let mut merged = engine()
        .merge(vec![Box::new(first), Box::new(second)], &order_by_id())
        .unwrap();
    assert!(merged.next().unwrap());
    drop(merged);
    for counter in counters {
        assert_eq!(counter.get(), 1);
    }
}

#[test]
fn test_rejected_shape_closes_shards() {
    let narrow = shard(&["id"], vec![vec![Value::Int(1)]]);
    let wide = shard(&["id", "user_id"], vec![vec![Value::Int(2), Value::Int(7)]]);
    let counters = [narrow.close_counter(), wide.close_counter()];
    let statement = order_by_id().with_projection_count(2);

    let err = engine()
        .merge(vec![Box::new(narrow), Box::new(wide)], &statement)
        .err()
        .unwrap();
    assert_eq!(
        err,
        Error::ColumnCountMismatch {
            shard: 0,
            expected: 2,
            actual: 1
        }
    );
    for counter in counters {
        assert_eq!(counter.get(), 1);
    }
}

#[test]
fn test_show_tables_maps_actual_names_back() {
    let statement = StatementShape::new(StatementKind::Dal(DalKind::ShowTables), "SHOW TABLES");
    let tables = |names: &[&str]| -> Box<dyn QueryResult> {
        Box::new(shard(
            &["Tables_in_db"],
            names.iter().map(|n| vec![Value::from(*n)]).collect(),
        ))
    };
    let mut merged = engine()
        .merge(
            vec![
                tables(&["t_order_0", "t_order_1", "t_order_item_0", "t_config"]),
                tables(&["t_order_0", "t_order_item_1", "t_config", "t_local"]),
            ],
            &statement,
        )
        .unwrap();
    assert_eq!(
        drain_column(merged.as_mut(), 0),
        vec![
            Value::from("t_order"),
            Value::from("t_order_item"),
            Value::from("t_config"),
            Value::from("t_local"),
        ]
    );
}

#[test]
fn test_show_tables_ignores_pagination() {
    let statement = StatementShape::new(StatementKind::Dal(DalKind::ShowTables), "SHOW TABLES")
        .with_pagination(5, Some(1));
    let mut merged = engine()
        .merge(
            vec![
                Box::new(shard(&["t"], vec![vec![Value::from("a")]])),
                Box::new(shard(&["t"], vec![vec![Value::from("b")]])),
            ],
            &statement,
        )
        .unwrap();
    assert_eq!(drain_column(merged.as_mut(), 0).len(), 2);
}

fn encrypt_runtime() -> ShardingRuntime {
    let encrypt_rule = EncryptRule::new().with_column(
        "t_user",
        EncryptColumn::new("name", "name_cipher", Arc::new(ReverseAlgorithm))
            .with_assisted_query("name_assisted", Arc::new(Sha256AssistedQueryAlgorithm::new("s"))),
    );
    ShardingRuntime::new(order_rule(), ShardingProps::default()).with_encrypt_rule(encrypt_rule)
}

#[test]
fn test_encrypted_column_decrypted_on_merge() {
    let runtime = encrypt_runtime();
    let statement = StatementShape::select("SELECT user_id, name_cipher FROM t_user")
        .with_tables(&["t_user"])
        .with_order_by(vec![OrderByItem::asc(0)]);
    let labels = ["user_id", "name_cipher"];
    let row = |id: i64, cipher: &str| vec![Value::Int(id), Value::from(cipher)];
    let mut merged = runtime
        .merge(
            vec![
                Box::new(shard(&labels, vec![row(2, "bob"), row(4, "naj")])),
                Box::new(shard(&labels, vec![row(1, "ecila"), row(3, "lorac")])),
            ],
            &statement,
        )
        .unwrap();
    assert_eq!(
        drain_column(merged.as_mut(), 1),
        vec![
            Value::from("alice"),
            Value::from("bob"),
            Value::from("carol"),
            Value::from("jan"),
        ]
    );
}

#[test]
fn test_encrypted_null_stays_null() {
    let runtime = encrypt_runtime();
    let statement = StatementShape::select("SELECT name_cipher FROM t_user").with_tables(&["t_user"]);
    let mut merged = runtime
        .merge(
            vec![Box::new(shard(&["name_cipher"], vec![vec![Value::Null]]))],
            &statement,
        )
        .unwrap();
    assert!(merged.next().unwrap());
    assert_eq!(merged.value(0).unwrap(), Value::Null);
    assert!(merged.was_null());
}

#[test]
fn test_describe_shows_logic_column_names() {
    let runtime = encrypt_runtime();
    let statement = StatementShape::new(StatementKind::Dal(DalKind::Describe), "DESC t_user")
        .with_tables(&["t_user"]);
    let rows = vec![
        vec![Value::from("user_id"), Value::from("bigint")],
        vec![Value::from("name_cipher"), Value::from("varchar(255)")],
        vec![Value::from("name_assisted"), Value::from("varchar(64)")],
    ];
    let mut merged = runtime
        .merge(vec![Box::new(shard(&["Field", "Type"], rows))], &statement)
        .unwrap();
    assert_eq!(
        drain_column(merged.as_mut(), 0),
        vec![Value::from("user_id"), Value::from("name"), Value::from("name")]
    );
}

#[test]
fn test_empty_result_list_is_rejected() {
    assert!(matches!(
        engine().merge(Vec::new(), &order_by_id()),
        Err(Error::QueryResult(_))
    ));
}

proptest! {
    #[test]
    fn prop_order_by_merge_is_sorted_and_complete(
        mut shards in prop::collection::vec(prop::collection::vec(-100i64..100, 0..20), 1..6)
    ) {
        for values in shards.iter_mut() {
            values.sort_unstable();
        }
        let mut expected: Vec<i64> = shards.iter().flatten().copied().collect();
        expected.sort_unstable();

        let results = shards.iter().map(|values| int_shard(values)).collect();
        let mut merged = engine().merge(results, &order_by_id()).unwrap();
        prop_assert_eq!(ints(drain_column(merged.as_mut(), 0)), expected);
    }

    #[test]
    fn prop_limit_takes_a_window_of_the_sorted_stream(
        mut shards in prop::collection::vec(prop::collection::vec(0i64..50, 0..10), 2..5),
        offset in 0u64..15,
        limit in 0u64..15,
    ) {
        for values in shards.iter_mut() {
            values.sort_unstable();
        }
        let mut all: Vec<i64> = shards.iter().flatten().copied().collect();
        all.sort_unstable();
        let expected: Vec<i64> = all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        let statement = order_by_id().with_pagination(offset, Some(limit));
        let results = shards.iter().map(|values| int_shard(values)).collect();
        let mut merged = engine().merge(results, &statement).unwrap();
        prop_assert_eq!(ints(drain_column(merged.as_mut(), 0)), expected);
    }
}
