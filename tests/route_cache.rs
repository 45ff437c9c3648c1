mod common;

use common::*;
use shardgate::metrics::METRICS;
use shardgate::statement::ShardingCondition;
use shardgate::{RouteCacheConfig, ShardingProps, ShardingRuntime, StatementShape, Value};
use std::sync::Arc;

fn point_query() -> StatementShape {
    StatementShape::select("SELECT * FROM t_order WHERE user_id = ? AND order_id = ?")
        .with_tables(&["t_order"])
        .with_condition(ShardingCondition::new(vec![
            equal("t_order", "user_id", 0),
            equal("t_order", "order_id", 1),
        ]))
}

fn runtime_with(config: RouteCacheConfig) -> ShardingRuntime {
    let props = ShardingProps {
        sql_show: false,
        route_cache: config,
    };
    ShardingRuntime::new(order_rule(), props)
}

#[test]
fn test_cached_route_matches_fresh_route() {
    let runtime = runtime_with(RouteCacheConfig::default());
    let statement = point_query();
    let params = [Value::Int(3), Value::Int(4)];

    let first = runtime.route(&statement, &params, None).unwrap();
    let second = runtime.route(&statement, &params, None).unwrap();
    let fresh = runtime.router().router().route(&statement, &params, None).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, fresh);
    let stats = runtime.router().cache().stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.size, 1);
}

#[test]
fn test_different_parameters_get_their_own_entry() {
    let runtime = runtime_with(RouteCacheConfig::default());
    let statement = point_query();

    let a = runtime.route(&statement, &[Value::Int(0), Value::Int(0)], None).unwrap();
    let b = runtime.route(&statement, &[Value::Int(1), Value::Int(1)], None).unwrap();
    assert_eq!(a.units[0].to_string(), "ds_0[t_order_0]");
    assert_eq!(b.units[0].to_string(), "ds_1[t_order_1]");
    assert_eq!(runtime.router().cache().len(), 2);
}

#[test]
fn test_multi_shard_routes_are_never_cached() {
    let runtime = runtime_with(RouteCacheConfig::default());
    let statement = StatementShape::select("SELECT * FROM t_order WHERE user_id = ?")
        .with_tables(&["t_order"])
        .with_condition(ShardingCondition::new(vec![equal("t_order", "user_id", 0)]));

    let context = runtime.route(&statement, &[Value::Int(1)], None).unwrap();
    assert_eq!(context.units.len(), 2);
    assert!(runtime.router().cache().is_empty());
}

#[test]
fn test_long_sql_bypasses_cache() {
    let runtime = runtime_with(RouteCacheConfig {
        max_sql_length: 16,
        ..RouteCacheConfig::default()
    });
    let context = runtime
        .route(&point_query(), &[Value::Int(3), Value::Int(4)], None)
        .unwrap();
    assert_eq!(context.units.len(), 1);
    let stats = runtime.router().cache().stats();
    assert_eq!(stats.skips, 1);
    assert!(runtime.router().cache().is_empty());
}

#[test]
fn test_disabled_cache_and_clear() {
    let runtime = runtime_with(RouteCacheConfig {
        enabled: false,
        ..RouteCacheConfig::default()
    });
    runtime
        .route(&point_query(), &[Value::Int(3), Value::Int(4)], None)
        .unwrap();
    assert!(runtime.router().cache().is_empty());

    let runtime = runtime_with(RouteCacheConfig::default());
    runtime
        .route(&point_query(), &[Value::Int(3), Value::Int(4)], None)
        .unwrap();
    assert_eq!(runtime.router().cache().len(), 1);
    runtime.clear_route_cache();
    assert!(runtime.router().cache().is_empty());
}

#[test]
fn test_missing_parameter_fails_without_caching() {
    let runtime = runtime_with(RouteCacheConfig::default());
    assert!(runtime.route(&point_query(), &[Value::Int(3)], None).is_err());
    assert!(runtime.router().cache().is_empty());
}

#[test]
fn test_cache_statistics_are_exported() {
    let runtime = runtime_with(RouteCacheConfig::default());
    let params = [Value::Int(3), Value::Int(4)];
    runtime.route(&point_query(), &params, None).unwrap();
    runtime.route(&point_query(), &params, None).unwrap();

    let exported = runtime.export_metrics().unwrap();
    assert!(exported.contains("shardgate_route_cache_metrics"));
    assert!(exported.contains("shardgate_routes_total"));
}

#[test]
fn test_cache_hits_are_counted_as_routes() {
    let runtime = ShardingRuntime::new(
        order_rule(),
        ShardingProps {
            sql_show: true,
            route_cache: RouteCacheConfig::default(),
        },
    );
    let params = [Value::Int(5), Value::Int(6)];
    runtime.route(&point_query(), &params, None).unwrap();

    let before = METRICS.read().route_count("standard", true);
    for _ in 0..3 {
        runtime.route(&point_query(), &params, None).unwrap();
    }
    assert_eq!(runtime.router().cache().stats().hits, 3);
    assert!(METRICS.read().route_count("standard", true) >= before + 3);
}

#[test]
fn test_concurrent_routing_shares_one_cache() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 200;
    let maximum_size = 8;
    let runtime = Arc::new(runtime_with(RouteCacheConfig {
        maximum_size,
        ..RouteCacheConfig::default()
    }));

    let shared = Arc::clone(&runtime);
    run_concurrent_with_barrier(THREADS, move |thread_id, barrier| {
        let statement = point_query();
        barrier.wait();
        for round in 0..ROUNDS {
            // 16 keys shared by every thread, more than the cache holds
            let key = ((thread_id + round) % 16) as i64;
            let params = [Value::Int(key / 4), Value::Int(key % 4)];
            let routed = shared.route(&statement, &params, None).unwrap();
            let fresh = shared.router().router().route(&statement, &params, None).unwrap();
            assert_eq!(routed, fresh);
            assert!(shared.router().cache().len() <= maximum_size);
        }
    });

    let stats = runtime.router().cache().stats();
    assert_eq!(stats.hits + stats.misses, (THREADS * ROUNDS) as u64);
    assert_eq!(stats.skips, 0);
    assert!(stats.size <= maximum_size);
    assert!(stats.hits > 0);
}
