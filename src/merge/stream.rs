use super::cursors::ShardCursors;
use super::MergedResult;
use crate::error::{Error, Result};
use crate::value::Value;

/// Concatenates shard results in shard order. With one shard this is a pure pass-through.
pub struct IteratorStreamMergedResult {
    cursors: ShardCursors,
    current: usize,
    last_null: bool,
}

impl IteratorStreamMergedResult {
    pub fn new(cursors: ShardCursors) -> Self {
        Self {
            cursors,
            current: 0,
            last_null: false,
        }
    }
}

impl MergedResult for IteratorStreamMergedResult {
    fn next(&mut self) -> Result<bool> {
        while self.current < self.cursors.len() {
            if self.cursors.advance(self.current)? {
                return Ok(true);
            }
            self.cursors.close(self.current)?;
            self.current += 1;
        }
        Ok(false)
    }

    fn value(&mut self, index: usize) -> Result<Value> {
        let cursor = self
            .cursors
            .get_mut(self.current)
            .ok_or_else(|| Error::QueryResult("No current row".to_string()))?;
        let value = cursor.value(index)?;
        self.last_null = value.is_null();
        Ok(value)
    }

    fn was_null(&self) -> bool {
        self.last_null
    }

    fn close(&mut self) -> Result<()> {
        self.current = self.cursors.len();
        self.cursors.close_all()
    }
}
