use super::cursors::ShardCursors;
use super::memory::{read_row, MemoryMergedResult};
use super::MergedResult;
use crate::error::{Error, Result};
use crate::rule::ShardingRule;
use crate::value::Value;
use std::collections::HashSet;

/// `SHOW TABLES`: every shard's rows with actual table names mapped back to logic
/// names, duplicates removed in first-seen order.
pub fn merge_show_tables(
    mut cursors: ShardCursors,
    rule: &ShardingRule,
    column_count: usize,
) -> Result<MemoryMergedResult> {
    let mut seen: HashSet<Vec<Value>> = HashSet::new();
    let mut rows = Vec::new();
    for shard in 0..cursors.len() {
        while cursors.advance(shard)? {
            let cursor = cursors
                .get_mut(shard)
                .ok_or_else(|| Error::QueryResult(format!("Unknown shard {}", shard)))?;
            let mut row = read_row(cursor.as_mut(), column_count)?;
            if let Some(Value::Text(actual)) = row.first() {
                if let Some(logic) = rule.find_logic_table_by_actual(actual) {
                    row[0] = Value::Text(logic.to_string());
                }
            }
            if seen.insert(row.clone()) {
                rows.push(row);
            }
        }
        cursors.close(shard)?;
    }
    Ok(MemoryMergedResult::new(rows))
}

/// `SHOW CREATE TABLE` / `DESCRIBE`: the first shard speaks for all of them, with
/// actual table names rewritten to the logic name.
pub struct LogicTableRewriteMergedResult {
    cursors: ShardCursors,
    logic_table: String,
    actual_tables: Vec<String>,
    last_null: bool,
}

impl LogicTableRewriteMergedResult {
    pub fn new(mut cursors: ShardCursors, rule: &ShardingRule, logic_table: &str) -> Result<Self> {
        for shard in 1..cursors.len() {
            cursors.close(shard)?;
        }
        let mut actual_tables: Vec<String> = rule
            .find_table_rule(logic_table)
            .map(|r| r.data_nodes().iter().map(|n| n.table.clone()).collect())
            .unwrap_or_default();
        actual_tables.sort();
        actual_tables.dedup();
        actual_tables.retain(|t| !t.eq_ignore_ascii_case(logic_table));
        Ok(Self {
            cursors,
            logic_table: logic_table.to_string(),
            actual_tables,
            last_null: false,
        })
    }

    /// Replace every whole identifier naming an actual table, quoted or not.
    fn rewrite(&self, text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find(is_identifier_char) {
            result.push_str(&rest[..start]);
            let word = &rest[start..];
            let end = word.find(|c: char| !is_identifier_char(c)).unwrap_or(word.len());
            let identifier = &word[..end];
            if self.actual_tables.iter().any(|t| t.eq_ignore_ascii_case(identifier)) {
                result.push_str(&self.logic_table);
            } else {
                result.push_str(identifier);
            }
            rest = &word[end..];
        }
        result.push_str(rest);
        result
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl MergedResult for LogicTableRewriteMergedResult {
    fn next(&mut self) -> Result<bool> {
        if self.cursors.advance(0)? {
            return Ok(true);
        }
        self.cursors.close_all()?;
        Ok(false)
    }

    fn value(&mut self, index: usize) -> Result<Value> {
        let cursor = self
            .cursors
            .get_mut(0)
            .ok_or_else(|| Error::QueryResult("No shard result".to_string()))?;
        let value = match cursor.value(index)? {
            Value::Text(text) => Value::Text(self.rewrite(&text)),
            other => other,
        };
        self.last_null = value.is_null();
        Ok(value)
    }

    fn was_null(&self) -> bool {
        self.last_null
    }

    fn close(&mut self) -> Result<()> {
        self.cursors.close_all()
    }
}
