use super::QueryResult;
use crate::error::{Error, Result};
use tracing::warn;

/// Owns every shard cursor of one merge and closes each exactly once, on
/// exhaustion, early termination, explicit close or drop.
pub struct ShardCursors {
    cursors: Vec<Box<dyn QueryResult>>,
    closed: Vec<bool>,
}

impl ShardCursors {
    pub fn new(cursors: Vec<Box<dyn QueryResult>>) -> Self {
        let closed = vec![false; cursors.len()];
        Self { cursors, closed }
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub fn get_mut(&mut self, shard: usize) -> Option<&mut Box<dyn QueryResult>> {
        self.cursors.get_mut(shard)
    }

    pub fn column_count(&self, shard: usize) -> Option<usize> {
        self.cursors.get(shard).map(|cursor| cursor.column_count())
    }

    pub fn column_label(&self, shard: usize, index: usize) -> Result<String> {
        match self.cursors.get(shard) {
            Some(cursor) => cursor.column_label(index),
            None => Err(Error::QueryResult(format!("No shard cursor at {}", shard))),
        }
    }

    pub fn is_closed(&self, shard: usize) -> bool {
        self.closed.get(shard).copied().unwrap_or(true)
    }

    /// Advance one shard. A closed shard reports no more rows.
    pub fn advance(&mut self, shard: usize) -> Result<bool> {
        if self.is_closed(shard) {
            return Ok(false);
        }
        self.cursors[shard].next()
    }

    pub fn close(&mut self, shard: usize) -> Result<()> {
        if self.is_closed(shard) {
            return Ok(());
        }
        self.closed[shard] = true;
        self.cursors[shard].close()
    }

    /// Close every open cursor, returning the first failure after attempting all.
    pub fn close_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for shard in 0..self.cursors.len() {
            if let Err(e) = self.close(shard) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ShardCursors {
    fn drop(&mut self) {
        if let Err(e) = self.close_all() {
            warn!("Failed to close shard cursor: {}", e);
        }
    }
}
