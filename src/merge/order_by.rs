use super::cursors::ShardCursors;
use super::MergedResult;
use crate::error::{Error, Result};
use crate::statement::{NullOrder, OrderByItem, OrderDirection};
use crate::value::Value;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Compare one order key. NULL placement is independent of the direction.
pub fn compare_order_value(a: &Value, b: &Value, item: &OrderByItem) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => match item.nulls {
            NullOrder::First => Ordering::Less,
            NullOrder::Last => Ordering::Greater,
        },
        (false, true) => match item.nulls {
            NullOrder::First => Ordering::Greater,
            NullOrder::Last => Ordering::Less,
        },
        (false, false) => {
            let ordering = if item.case_sensitive {
                a.compare(b)
            } else {
                a.compare_ignore_case(b)
            };
            match item.direction {
                OrderDirection::Asc => ordering,
                OrderDirection::Desc => ordering.reverse(),
            }
        }
    }
}

pub fn compare_order_keys(a: &[Value], b: &[Value], items: &[OrderByItem]) -> Ordering {
    for ((x, y), item) in a.iter().zip(b).zip(items) {
        let ordering = compare_order_value(x, y, item);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Current row of one shard as seen by the heap.
struct OrderByValue {
    shard: usize,
    keys: Vec<Value>,
    items: Arc<[OrderByItem]>,
}

impl OrderByValue {
    fn read(cursors: &mut ShardCursors, shard: usize, items: Arc<[OrderByItem]>) -> Result<Self> {
        let cursor = cursors
            .get_mut(shard)
            .ok_or_else(|| Error::QueryResult(format!("Unknown shard {}", shard)))?;
        let keys = items
            .iter()
            .map(|item| cursor.value(item.index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { shard, keys, items })
    }
}

impl Ord for OrderByValue {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_order_keys(&self.keys, &other.keys, &self.items)
            // Equal keys keep shard arrival order
            .then(self.shard.cmp(&other.shard))
    }
}

impl PartialOrd for OrderByValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OrderByValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderByValue {}

/// K-way merge of shard results that are each already sorted by the order-by items.
pub struct OrderByStreamMergedResult {
    cursors: ShardCursors,
    items: Arc<[OrderByItem]>,
    heap: BinaryHeap<Reverse<OrderByValue>>,
    current: Option<usize>,
    started: bool,
    last_null: bool,
}

impl OrderByStreamMergedResult {
    pub fn new(cursors: ShardCursors, items: Vec<OrderByItem>) -> Self {
        let heap = BinaryHeap::with_capacity(cursors.len());
        Self {
            cursors,
            items: items.into(),
            heap,
            current: None,
            started: false,
            last_null: false,
        }
    }

    fn push_if_has_row(&mut self, shard: usize) -> Result<()> {
        if self.cursors.advance(shard)? {
            let value = OrderByValue::read(&mut self.cursors, shard, self.items.clone())?;
            self.heap.push(Reverse(value));
        } else {
            self.cursors.close(shard)?;
        }
        Ok(())
    }
}

impl MergedResult for OrderByStreamMergedResult {
    fn next(&mut self) -> Result<bool> {
        if !self.started {
            self.started = true;
            for shard in 0..self.cursors.len() {
                self.push_if_has_row(shard)?;
            }
        } else if let Some(shard) = self.current.take() {
            self.push_if_has_row(shard)?;
        }

        match self.heap.pop() {
            Some(Reverse(value)) => {
                self.current = Some(value.shard);
                Ok(true)
            }
            None => {
                self.cursors.close_all()?;
                Ok(false)
            }
        }
    }

    fn value(&mut self, index: usize) -> Result<Value> {
        let shard = self
            .current
            .ok_or_else(|| Error::QueryResult("No current row".to_string()))?;
        let cursor = self
            .cursors
            .get_mut(shard)
            .ok_or_else(|| Error::QueryResult(format!("Unknown shard {}", shard)))?;
        let value = cursor.value(index)?;
        self.last_null = value.is_null();
        Ok(value)
    }

    fn was_null(&self) -> bool {
        self.last_null
    }

    fn close(&mut self) -> Result<()> {
        self.heap.clear();
        self.current = None;
        self.started = true;
        self.cursors.close_all()
    }
}
