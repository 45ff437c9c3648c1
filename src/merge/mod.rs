//! Result merge engine
//!
//! Turns the per-shard [`QueryResult`]s of one routed statement into a single
//! forward-only [`MergedResult`]. The variant is picked from the statement
//! shape; pagination and decryption wrap whichever variant was chosen.

pub mod aggregation;
pub mod cursors;
pub mod dal;
pub mod encrypt;
pub mod group_by;
pub mod limit;
pub mod memory;
pub mod order_by;
pub mod stream;

pub use cursors::ShardCursors;
pub use dal::LogicTableRewriteMergedResult;
pub use encrypt::{
    AssistedQueryAlgorithm, EncryptAlgorithm, EncryptColumn, EncryptMergedResult, EncryptRule,
    Sha256AssistedQueryAlgorithm,
};
pub use group_by::{GroupByMemoryMergedResult, GroupByStreamMergedResult};
pub use limit::LimitDecoratorMergedResult;
pub use memory::{CloseCounter, MemoryMergedResult, MemoryQueryResult};
pub use order_by::OrderByStreamMergedResult;
pub use stream::IteratorStreamMergedResult;

use crate::error::{Error, Result};
use crate::metrics::METRICS;
use crate::rule::ShardingRule;
use crate::statement::{DalKind, StatementKind, StatementShape};
use crate::value::Value;
use std::sync::Arc;
use tracing::debug;

/// Forward-only cursor over one shard's result, supplied by the executor.
pub trait QueryResult: Send {
    fn next(&mut self) -> Result<bool>;
    fn value(&mut self, index: usize) -> Result<Value>;
    /// Whether the last value read was NULL.
    fn was_null(&self) -> bool;
    fn column_count(&self) -> usize;
    fn column_label(&self, index: usize) -> Result<String>;
    fn close(&mut self) -> Result<()>;
}

/// Forward-only cursor over the merged result of every shard.
pub trait MergedResult: Send {
    fn next(&mut self) -> Result<bool>;
    fn value(&mut self, index: usize) -> Result<Value>;
    fn was_null(&self) -> bool;
    fn close(&mut self) -> Result<()>;
}

pub struct MergeEngine {
    rule: Arc<ShardingRule>,
    encrypt_rule: Option<Arc<EncryptRule>>,
}

impl MergeEngine {
    pub fn new(rule: Arc<ShardingRule>) -> Self {
        Self {
            rule,
            encrypt_rule: None,
        }
    }

    pub fn with_encrypt_rule(mut self, encrypt_rule: Arc<EncryptRule>) -> Self {
        self.encrypt_rule = Some(encrypt_rule);
        self
    }

    pub fn merge(
        &self,
        results: Vec<Box<dyn QueryResult>>,
        statement: &StatementShape,
    ) -> Result<Box<dyn MergedResult>> {
        if results.is_empty() {
            return Err(Error::QueryResult("No query results to merge".to_string()));
        }
        // Every exit path below closes the shards through the cursor set
        let cursors = ShardCursors::new(results);
        let column_count = validate_shape(&cursors, statement)?;
        let labels = (0..column_count)
            .map(|i| cursors.column_label(0, i))
            .collect::<Result<Vec<_>>>()?;
        let shard_count = cursors.len();

        let (merged, variant) = self.build(cursors, statement, column_count)?;
        debug!("Merging {} shard results with {}", shard_count, variant);
        METRICS.read().record_merge(variant);

        let merged = match (&statement.pagination, statement.kind) {
            (Some(pagination), kind) if shard_count > 1 && !matches!(kind, StatementKind::Dal(_)) => {
                Box::new(LimitDecoratorMergedResult::new(merged, *pagination)) as Box<dyn MergedResult>
            }
            _ => merged,
        };

        Ok(self.decorate_encrypt(merged, statement, &labels))
    }

    fn build(
        &self,
        cursors: ShardCursors,
        statement: &StatementShape,
        column_count: usize,
    ) -> Result<(Box<dyn MergedResult>, &'static str)> {
        if let StatementKind::Dal(kind) = statement.kind {
            return self.build_dal(cursors, statement, kind, column_count);
        }
        if cursors.len() == 1 && !statement.has_grouping() {
            return Ok((Box::new(IteratorStreamMergedResult::new(cursors)), "pass_through"));
        }
        if statement.has_grouping() {
            if statement.group_by_matches_order_by() {
                return Ok((
                    Box::new(GroupByStreamMergedResult::new(cursors, statement, column_count)),
                    "group_by_stream",
                ));
            }
            return Ok((
                Box::new(GroupByMemoryMergedResult::new(cursors, statement, column_count)?),
                "group_by_memory",
            ));
        }
        if !statement.order_by.is_empty() {
            return Ok((
                Box::new(OrderByStreamMergedResult::new(cursors, statement.order_by.clone())),
                "order_by_stream",
            ));
        }
        Ok((Box::new(IteratorStreamMergedResult::new(cursors)), "iterator_stream"))
    }

    fn build_dal(
        &self,
        cursors: ShardCursors,
        statement: &StatementShape,
        kind: DalKind,
        column_count: usize,
    ) -> Result<(Box<dyn MergedResult>, &'static str)> {
        match (kind, statement.tables.first()) {
            (DalKind::ShowTables, _) => Ok((
                Box::new(dal::merge_show_tables(cursors, &self.rule, column_count)?),
                "show_tables",
            )),
            (DalKind::ShowCreateTable | DalKind::Describe, Some(table)) => Ok((
                Box::new(LogicTableRewriteMergedResult::new(cursors, &self.rule, table)?),
                "logic_table_rewrite",
            )),
            _ => Ok((Box::new(IteratorStreamMergedResult::new(cursors)), "pass_through")),
        }
    }

    fn decorate_encrypt(
        &self,
        merged: Box<dyn MergedResult>,
        statement: &StatementShape,
        labels: &[String],
    ) -> Box<dyn MergedResult> {
        let Some(rule) = self.encrypt_rule.as_deref() else {
            return merged;
        };
        if !rule.covers_any(&statement.tables) {
            return merged;
        }
        match statement.kind {
            StatementKind::Dal(DalKind::Describe) => {
                Box::new(EncryptMergedResult::for_describe(merged, rule, &statement.tables))
            }
            StatementKind::Dal(_) => merged,
            _ => Box::new(EncryptMergedResult::for_query(
                merged,
                rule,
                &statement.tables,
                labels,
            )),
        }
    }
}

/// Column count shared by every shard, checked against the statement's
/// declared projection and its order/group/aggregate column indexes.
fn validate_shape(cursors: &ShardCursors, statement: &StatementShape) -> Result<usize> {
    let expected = match statement.projection_count {
        Some(count) => count,
        None => cursors.column_count(0).unwrap_or(0),
    };
    if statement.projection_count.is_some() || statement.has_grouping() || !statement.order_by.is_empty() {
        for shard in 0..cursors.len() {
            let actual = cursors.column_count(shard).unwrap_or(0);
            if actual != expected {
                return Err(Error::ColumnCountMismatch {
                    shard,
                    expected,
                    actual,
                });
            }
        }
    }

    let indexes = statement
        .order_by
        .iter()
        .chain(&statement.group_by)
        .map(|item| item.index)
        .chain(statement.aggregations.iter().flat_map(|a| a.column_indexes()));
    for index in indexes {
        if index >= expected {
            return Err(Error::ColumnIndexOutOfRange {
                index,
                count: expected,
            });
        }
    }
    Ok(expected)
}
