use super::{MergedResult, QueryResult};
use crate::error::{Error, Result};
use crate::value::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared count of `close()` calls on a cursor.
#[derive(Debug, Clone, Default)]
pub struct CloseCounter(Arc<AtomicUsize>);

impl CloseCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Query result backed by rows held in memory.
#[derive(Debug)]
pub struct MemoryQueryResult {
    labels: Vec<String>,
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
    last_null: bool,
    closed: bool,
    closes: CloseCounter,
}

impl MemoryQueryResult {
    pub fn new(labels: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            labels,
            rows,
            position: None,
            last_null: false,
            closed: false,
            closes: CloseCounter::default(),
        }
    }

    pub fn close_counter(&self) -> CloseCounter {
        self.closes.clone()
    }

    fn current_row(&self) -> Result<&Vec<Value>> {
        if self.closed {
            return Err(Error::QueryResult("Result is closed".to_string()));
        }
        self.position
            .and_then(|p| self.rows.get(p))
            .ok_or_else(|| Error::QueryResult("No current row".to_string()))
    }
}

impl QueryResult for MemoryQueryResult {
    fn next(&mut self) -> Result<bool> {
        if self.closed {
            return Err(Error::QueryResult("Result is closed".to_string()));
        }
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next.min(self.rows.len()));
        Ok(next < self.rows.len())
    }

    fn value(&mut self, index: usize) -> Result<Value> {
        let row = self.current_row()?;
        let value = row
            .get(index)
            .cloned()
            .ok_or(Error::ColumnIndexOutOfRange {
                index,
                count: row.len(),
            })?;
        self.last_null = value.is_null();
        Ok(value)
    }

    fn was_null(&self) -> bool {
        self.last_null
    }

    fn column_count(&self) -> usize {
        self.labels.len()
    }

    fn column_label(&self, index: usize) -> Result<String> {
        self.labels
            .get(index)
            .cloned()
            .ok_or(Error::ColumnIndexOutOfRange {
                index,
                count: self.labels.len(),
            })
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.closes.increment();
        Ok(())
    }
}

/// Fully materialized merge output.
#[derive(Debug, Default)]
pub struct MemoryMergedResult {
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
    last_null: bool,
}

impl MemoryMergedResult {
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows,
            position: None,
            last_null: false,
        }
    }
}

impl MergedResult for MemoryMergedResult {
    fn next(&mut self) -> Result<bool> {
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next.min(self.rows.len()));
        Ok(next < self.rows.len())
    }

    fn value(&mut self, index: usize) -> Result<Value> {
        let row = self
            .position
            .and_then(|p| self.rows.get(p))
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
        self.position = Some(self.rows.len());
        Ok(())
    }
}

/// Read every column of the current row.
pub(crate) fn read_row(result: &mut dyn QueryResult, column_count: usize) -> Result<Vec<Value>> {
    (0..column_count).map(|i| result.value(i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_query_result() {
        let mut result = MemoryQueryResult::new(
            vec!["id".to_string(), "name".to_string()],
            vec![vec![Value::Int(1), Value::Null]],
        );
        assert_eq!(result.column_count(), 2);
        assert_eq!(result.column_label(1).unwrap(), "name");
        assert!(result.value(0).is_err());
        assert!(result.next().unwrap());
        assert_eq!(result.value(0).unwrap(), Value::Int(1));
        assert!(!result.was_null());
        assert_eq!(result.value(1).unwrap(), Value::Null);
        assert!(result.was_null());
        assert!(!result.next().unwrap());
        assert!(!result.next().unwrap());
        result.close().unwrap();
        assert!(result.next().is_err());
        assert_eq!(result.close_counter().get(), 1);
    }

    #[test]
    fn test_memory_merged_result() {
        let mut merged = MemoryMergedResult::new(vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
        assert!(merged.next().unwrap());
        assert!(merged.next().unwrap());
        assert_eq!(merged.value(0).unwrap(), Value::Int(2));
        assert!(!merged.next().unwrap());
    }
}
