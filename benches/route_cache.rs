use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shardgate::merge::MemoryQueryResult;
use shardgate::statement::{Operand, OrderByItem, ShardingCondition, ShardingConditionValue};
use shardgate::{
    QueryResult, RouteCacheConfig, ShardingProps, ShardingRuleConfig, ShardingRuntime,
    StatementShape, Value,
};
use std::hint::black_box;
use std::time::Duration;

const RULE_JSON: &str = r#"{
    "data_sources": [{"name": "ds_0"}, {"name": "ds_1"}, {"name": "ds_2"}, {"name": "ds_3"}],
    "tables": [{
        "logic_table": "t_order",
        "actual_data_nodes": "ds_${0..3}.t_order_${0..7}",
        "database_strategy": {"column": "user_id", "algorithm": {"type": "MOD", "sharding_count": 4}},
        "table_strategy": {"column": "order_id", "algorithm": {"type": "HASH_MOD", "sharding_count": 8}}
    }]
}"#;

fn runtime(cache_enabled: bool) -> ShardingRuntime {
    let config = ShardingRuleConfig::from_json_str(RULE_JSON).unwrap();
    let props = ShardingProps {
        sql_show: false,
        route_cache: RouteCacheConfig {
            enabled: cache_enabled,
            ..RouteCacheConfig::default()
        },
    };
    ShardingRuntime::from_config(&config, props).unwrap()
}

fn point_query() -> StatementShape {
    let equal = |column: &str, index: usize| {
        ShardingConditionValue::equal("t_order", column, Operand::Parameter(index))
    };
    StatementShape::select("SELECT * FROM t_order WHERE user_id = ? AND order_id = ?")
        .with_tables(&["t_order"])
        .with_condition(ShardingCondition::new(vec![equal("user_id", 0), equal("order_id", 1)]))
}

fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");
    group.measurement_time(Duration::from_secs(5));
    let statement = point_query();

    for (name, enabled) in [("uncached", false), ("cached", true)] {
        let runtime = runtime(enabled);
        group.bench_function(BenchmarkId::new("point_query", name), |b| {
            let mut i = 0i64;
            b.iter(|| {
                // Cycle over a small key set so the cache stays warm
                i = (i + 1) % 64;
                let params = [Value::Int(i), Value::Int(i * 7)];
                black_box(runtime.route(black_box(&statement), &params, None).unwrap());
            });
        });
    }

    let runtime = runtime(true);
    let fan_out = StatementShape::select("SELECT * FROM t_order").with_tables(&["t_order"]);
    group.bench_function("full_fan_out", |b| {
        b.iter(|| black_box(runtime.route(black_box(&fan_out), &[], None).unwrap()));
    });

    group.finish();
}

fn bench_order_by_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_by_merge");
    let statement = StatementShape::select("SELECT id FROM t_order ORDER BY id")
        .with_tables(&["t_order"])
        .with_order_by(vec![OrderByItem::asc(0)]);
    let runtime = runtime(false);

    for shards in [4usize, 32].iter() {
        let rows_per_shard = 1000i64;
        group.throughput(Throughput::Elements(*shards as u64 * rows_per_shard as u64));
        group.bench_with_input(BenchmarkId::from_parameter(shards), shards, |b, &shards| {
            b.iter(|| {
                let results: Vec<Box<dyn QueryResult>> = (0..shards as i64)
                    .map(|s| {
                        let rows = (0..rows_per_shard)
                            .map(|v| vec![Value::Int(v * shards as i64 + s)])
                            .collect();
                        Box::new(MemoryQueryResult::new(vec!["id".to_string()], rows))
                            as Box<dyn QueryResult>
                    })
                    .collect();
                let mut merged = runtime.merge(results, &statement).unwrap();
                let mut count = 0u64;
                while merged.next().unwrap() {
                    black_box(merged.value(0).unwrap());
                    count += 1;
                }
                count
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_routing, bench_order_by_merge);
criterion_main!(benches);
