use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One physical (data source, table) destination of a logic table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            table: table.into(),
        }
    }

    /// Parse `data_source.table`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let (data_source, table) = text
            .split_once('.')
            .ok_or_else(|| Error::Config(format!("Invalid data node format '{}'", text)))?;
        if data_source.is_empty() || table.is_empty() || table.contains('.') {
            return Err(Error::Config(format!("Invalid data node format '{}'", text)));
        }
        Ok(Self::new(data_source, table))
    }

    /// Parse an inline data node expression such as `ds_${0..1}.t_order_${0..3}`.
    pub fn parse_inline(expression: &str) -> Result<Vec<Self>> {
        expand_inline_expression(expression)?
            .iter()
            .map(|each| Self::parse(each))
            .collect()
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

enum Segment {
    Literal(String),
    Choices(Vec<String>),
}

/// Expand an inline expression into concrete names.
///
/// Top-level commas separate independent expressions. Each `${a..b}` placeholder
/// expands to the inclusive numeric range, each `${[x, y]}` to the listed items; the
/// result is the cartesian product with the leftmost placeholder varying slowest.
pub fn expand_inline_expression(expression: &str) -> Result<Vec<String>> {
    let mut result = Vec::new();
    for each in split_top_level(expression)? {
        let each = each.trim();
        if each.is_empty() {
            continue;
        }
        let segments = parse_segments(each)?;
        let mut expanded = vec![String::new()];
        for segment in &segments {
            expanded = match segment {
                Segment::Literal(text) => expanded
                    .into_iter()
                    .map(|mut prefix| {
                        prefix.push_str(text);
                        prefix
                    })
                    .collect(),
                Segment::Choices(choices) => expanded
                    .iter()
                    .flat_map(|prefix| choices.iter().map(move |c| format!("{}{}", prefix, c)))
                    .collect(),
            };
        }
        result.extend(expanded);
    }
    Ok(result)
}

fn split_top_level(expression: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in expression.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    Error::Config(format!("Unbalanced braces in '{}'", expression))
                })?
            }
            ',' if depth == 0 => {
                parts.push(&expression[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(Error::Config(format!("Unbalanced braces in '{}'", expression)));
    }
    parts.push(&expression[start..]);
    Ok(parts)
}

fn parse_segments(expression: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = expression;
    while let Some(open) = rest.find("${") {
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_string()));
        }
        let after = &rest[open + 2..];
        let close = after
            .find('}')
            .ok_or_else(|| Error::Config(format!("Unclosed placeholder in '{}'", expression)))?;
        segments.push(Segment::Choices(parse_choices(after[..close].trim(), expression)?));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

fn parse_choices(body: &str, expression: &str) -> Result<Vec<String>> {
    if let Some(list) = body.strip_prefix('[').and_then(|b| b.strip_suffix(']')) {
        let items: Vec<String> = list
            .split(',')
            .map(|item| item.trim().trim_matches('\'').trim_matches('"').to_string())
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() {
            return Err(Error::Config(format!("Empty list placeholder in '{}'", expression)));
        }
        return Ok(items);
    }
    if let Some((low, high)) = body.split_once("..") {
        let parse = |s: &str| {
            s.trim().parse::<i64>().map_err(|_| {
                Error::Config(format!("Invalid range bound '{}' in '{}'", s.trim(), expression))
            })
        };
        let (low, high) = (parse(low)?, parse(high)?);
        if low > high {
            return Err(Error::Config(format!("Descending range in '{}'", expression)));
        }
        return Ok((low..=high).map(|v| v.to_string()).collect());
    }
    if body.is_empty() {
        return Err(Error::Config(format!("Empty placeholder in '{}'", expression)));
    }
    Ok(vec![body.to_string()])
}
