#![allow(dead_code)]

use shardgate::merge::{EncryptAlgorithm, MemoryQueryResult};
use shardgate::statement::{Operand, ShardingConditionValue};
use shardgate::{QueryResult, Result, ShardingRule, ShardingRuleConfig, Value};
use std::sync::{Arc, Barrier};
use std::thread;

// Two data sources on two instances, t_order/t_order_item bound together and
// sharded by user_id (database) and order_id (table).
pub const ORDER_RULE_JSON: &str = r#"{
    "data_sources": [
        {"name": "ds_0", "instance": "mysql-a"},
        {"name": "ds_1", "instance": "mysql-b"}
    ],
    "tables": [
        {
            "logic_table": "t_order",
            "actual_data_nodes": "ds_${0..1}.t_order_${0..1}",
            "table_strategy": {"column": "order_id", "algorithm": {"type": "MOD", "sharding_count": 2}},
            "key_generate": {"column": "order_id", "worker_id": 1}
        },
        {
            "logic_table": "t_order_item",
            "actual_data_nodes": "ds_${0..1}.t_order_item_${0..1}",
            "table_strategy": {"column": "order_id", "algorithm": {"type": "MOD", "sharding_count": 2}}
        },
        {
            "logic_table": "t_user",
            "actual_data_nodes": "ds_${0..1}.t_user"
        }
    ],
    "binding_tables": [["t_order", "t_order_item"]],
    "broadcast_tables": ["t_config", "t_dict"],
    "default_database_strategy": {"column": "user_id", "algorithm": {"type": "MOD", "sharding_count": 2}},
    "default_data_source": "ds_0"
}"#;

pub fn order_rule_config() -> ShardingRuleConfig {
    ShardingRuleConfig::from_json_str(ORDER_RULE_JSON).expect("Failed to parse rule config")
}

pub fn order_rule() -> ShardingRule {
    ShardingRule::from_config(&order_rule_config()).expect("Failed to build sharding rule")
}

pub fn equal(table: &str, column: &str, index: usize) -> ShardingConditionValue {
    ShardingConditionValue::equal(table, column, Operand::Parameter(index))
}

/// Single-column shard result of integers.
pub fn int_shard(values: &[i64]) -> Box<dyn QueryResult> {
    Box::new(MemoryQueryResult::new(
        vec!["id".to_string()],
        values.iter().map(|v| vec![Value::Int(*v)]).collect(),
    ))
}

pub fn shard(labels: &[&str], rows: Vec<Vec<Value>>) -> MemoryQueryResult {
    MemoryQueryResult::new(labels.iter().map(|l| l.to_string()).collect(), rows)
}

pub fn drain_column(merged: &mut dyn shardgate::MergedResult, index: usize) -> Vec<Value> {
    let mut values = Vec::new();
    while merged.next().expect("next failed") {
        values.push(merged.value(index).expect("value failed"));
    }
    values
}

/// Reversible cipher for tests: reverses text.
#[derive(Debug)]
pub struct ReverseAlgorithm;

impl EncryptAlgorithm for ReverseAlgorithm {
    fn kind(&self) -> &'static str {
        "REVERSE"
    }

    fn encrypt(&self, plain: &Value) -> Result<Value> {
        match plain {
            Value::Text(s) => Ok(Value::Text(s.chars().rev().collect())),
            other => Ok(other.clone()),
        }
    }

    fn decrypt(&self, cipher: &Value) -> Result<Value> {
        self.encrypt(cipher)
    }
}

/// Run `op` on `num_threads` threads that all start together at the barrier.
pub fn run_concurrent_with_barrier<F>(num_threads: usize, op: F)
where
    F: Fn(usize, Arc<Barrier>) + Send + Clone + 'static,
{
    let barrier = Arc::new(Barrier::new(num_threads));
    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let barrier = Arc::clone(&barrier);
            let op = op.clone();
            thread::spawn(move || op(thread_id, barrier))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}
