use super::aggregation::GroupAggregation;
use super::cursors::ShardCursors;
use super::memory::{read_row, MemoryMergedResult};
use super::order_by::{compare_order_keys, OrderByStreamMergedResult};
use super::MergedResult;
use crate::error::{Error, Result};
use crate::statement::{AggregationProjection, OrderByItem, StatementShape};
use crate::value::Value;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Group keys rarely exceed a handful of columns.
type GroupKey = SmallVec<[Value; 4]>;

fn group_key(row: &[Value], items: &[OrderByItem]) -> GroupKey {
    items
        .iter()
        .map(|item| row.get(item.index).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Hashable form of a group key; case-insensitive items fold text to lowercase.
fn hash_key(key: &[Value], items: &[OrderByItem]) -> GroupKey {
    key.iter()
        .zip(items)
        .map(|(value, item)| match value {
            Value::Text(s) if !item.case_sensitive => Value::Text(s.to_lowercase()),
            other => other.clone(),
        })
        .collect()
}

fn same_group(a: &[Value], b: &[Value], items: &[OrderByItem]) -> bool {
    compare_order_keys(a, b, items) == Ordering::Equal
}

/// Row produced when an aggregate-only query sees no input: COUNT is 0, the rest NULL.
fn empty_aggregate_row(column_count: usize, aggregations: &[AggregationProjection]) -> Vec<Value> {
    let mut row = vec![Value::Null; column_count];
    GroupAggregation::new(aggregations).write_into(aggregations, &mut row);
    row
}

/// Streaming group-by over shards already sorted by the group-by items.
pub struct GroupByStreamMergedResult {
    inner: OrderByStreamMergedResult,
    group_by: Vec<OrderByItem>,
    aggregations: Vec<AggregationProjection>,
    column_count: usize,
    pending: Option<Vec<Value>>,
    current: Option<Vec<Value>>,
    started: bool,
    emitted_any: bool,
    exhausted: bool,
    last_null: bool,
}

impl GroupByStreamMergedResult {
    pub fn new(cursors: ShardCursors, statement: &StatementShape, column_count: usize) -> Self {
        Self {
            inner: OrderByStreamMergedResult::new(cursors, statement.group_by.clone()),
            group_by: statement.group_by.clone(),
            aggregations: statement.aggregations.clone(),
            column_count,
            pending: None,
            current: None,
            started: false,
            emitted_any: false,
            exhausted: false,
            last_null: false,
        }
    }

    fn read_inner_row(&mut self) -> Result<Option<Vec<Value>>> {
        if !self.inner.next()? {
            return Ok(None);
        }
        let row = (0..self.column_count)
            .map(|i| self.inner.value(i))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(row))
    }
}

impl MergedResult for GroupByStreamMergedResult {
    fn next(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }
        if !self.started {
            self.started = true;
            self.pending = self.read_inner_row()?;
        }

        let Some(first) = self.pending.take() else {
            self.exhausted = true;
            self.current = None;
            if !self.emitted_any && self.group_by.is_empty() && !self.aggregations.is_empty() {
                self.emitted_any = true;
                self.current = Some(empty_aggregate_row(self.column_count, &self.aggregations));
                return Ok(true);
            }
            return Ok(false);
        };

        let key = group_key(&first, &self.group_by);
        let mut aggregation = GroupAggregation::new(&self.aggregations);
        aggregation.merge(&self.aggregations, &first)?;
        while let Some(row) = self.read_inner_row()? {
            if same_group(&key, &group_key(&row, &self.group_by), &self.group_by) {
                aggregation.merge(&self.aggregations, &row)?;
            } else {
                self.pending = Some(row);
                break;
            }
        }

        let mut output = first;
        aggregation.write_into(&self.aggregations, &mut output);
        self.current = Some(output);
        self.emitted_any = true;
        Ok(true)
    }

    fn value(&mut self, index: usize) -> Result<Value> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| Error::QueryResult("No current row".to_string()))?;
        let value = row.get(index).cloned().ok_or(Error::ColumnIndexOutOfRange {
            index,
            count: row.len(),
        })?;
        self.last_null = value.is_null();
        Ok(value)
    }

    fn was_null(&self) -> bool {
        self.last_null
    }

    fn close(&mut self) -> Result<()> {
        self.exhausted = true;
        self.current = None;
        self.pending = None;
        self.inner.close()
    }
}

/// Materializes every group, then sorts by the order-by items
/// (group-by items when there is no ORDER BY).
pub struct GroupByMemoryMergedResult {
    rows: MemoryMergedResult,
}

impl GroupByMemoryMergedResult {
    pub fn new(mut cursors: ShardCursors, statement: &StatementShape, column_count: usize) -> Result<Self> {
        let group_by = &statement.group_by;
        let aggregations = &statement.aggregations;
        let mut index: HashMap<GroupKey, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Value>, GroupAggregation)> = Vec::new();

        for shard in 0..cursors.len() {
            while cursors.advance(shard)? {
                let cursor = cursors
                    .get_mut(shard)
                    .ok_or_else(|| Error::QueryResult(format!("Unknown shard {}", shard)))?;
                let row = read_row(cursor.as_mut(), column_count)?;
                let key = hash_key(&group_key(&row, group_by), group_by);
                match index.get(&key) {
                    Some(&position) => groups[position].1.merge(aggregations, &row)?,
                    None => {
                        let mut aggregation = GroupAggregation::new(aggregations);
                        aggregation.merge(aggregations, &row)?;
                        index.insert(key, groups.len());
                        groups.push((row, aggregation));
                    }
                }
            }
            cursors.close(shard)?;
        }

        let mut rows: Vec<Vec<Value>> = groups
            .into_iter()
            .map(|(mut row, aggregation)| {
                aggregation.write_into(aggregations, &mut row);
                row
            })
            .collect();
        if rows.is_empty() && group_by.is_empty() && !aggregations.is_empty() {
            rows.push(empty_aggregate_row(column_count, aggregations));
        }

        let sort_items = if statement.order_by.is_empty() {
            group_by
        } else {
            &statement.order_by
        };
        rows.sort_by(|a, b| {
            compare_order_keys(&group_key(a, sort_items), &group_key(b, sort_items), sort_items)
        });

        Ok(Self {
            rows: MemoryMergedResult::new(rows),
        })
    }
}

impl MergedResult for GroupByMemoryMergedResult {
    fn next(&mut self) -> Result<bool> {
        self.rows.next()
    }

    fn value(&mut self, index: usize) -> Result<Value> {
        self.rows.value(index)
    }

    fn was_null(&self) -> bool {
        self.rows.was_null()
    }

    fn close(&mut self) -> Result<()> {
        self.rows.close()
    }
}
