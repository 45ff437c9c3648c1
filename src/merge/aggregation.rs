use crate::error::{Error, Result};
use crate::statement::{AggregationKind, AggregationProjection};
use crate::value::Value;
use std::cmp::Ordering;

fn type_error(kind: AggregationKind, value: &Value) -> Error {
    Error::AggregationType {
        function: kind.name().to_string(),
        value_type: value.type_name().to_string(),
    }
}

/// Sum two numeric partials; integers stay integers until they overflow.
fn add(kind: AggregationKind, acc: &Value, value: &Value) -> Result<Value> {
    match (acc, value) {
        (Value::Int(a), Value::Int(b)) => Ok(a
            .checked_add(*b)
            .map(Value::Int)
            .unwrap_or(Value::Float(*a as f64 + *b as f64))),
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(Value::Float(x + y)),
            (None, _) => Err(type_error(kind, a)),
            (_, None) => Err(type_error(kind, b)),
        },
    }
}

fn require_numeric(kind: AggregationKind, value: &Value) -> Result<()> {
    if value.is_numeric() {
        Ok(())
    } else {
        Err(type_error(kind, value))
    }
}

/// Running recombination of one aggregate projection across shard partials.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationUnit {
    Count(Value),
    Sum(Option<Value>),
    Min(Option<Value>),
    Max(Option<Value>),
    Avg { count: Value, sum: Option<Value> },
}

impl AggregationUnit {
    pub fn new(kind: AggregationKind) -> Self {
        match kind {
            AggregationKind::Count => AggregationUnit::Count(Value::Int(0)),
            AggregationKind::Sum => AggregationUnit::Sum(None),
            AggregationKind::Min => AggregationUnit::Min(None),
            AggregationKind::Max => AggregationUnit::Max(None),
            AggregationKind::Avg => AggregationUnit::Avg {
                count: Value::Int(0),
                sum: None,
            },
        }
    }

    /// Fold the partial values of one shard row.
    pub fn merge(&mut self, projection: &AggregationProjection, row: &[Value]) -> Result<()> {
        let cell = |index: usize| {
            row.get(index).ok_or(Error::ColumnIndexOutOfRange {
                index,
                count: row.len(),
            })
        };
        let kind = projection.kind;
        match self {
            AggregationUnit::Count(total) => {
                let value = cell(projection.index)?;
                if !value.is_null() {
                    require_numeric(kind, value)?;
                    *total = add(kind, total, value)?;
                }
            }
            AggregationUnit::Sum(total) => {
                let value = cell(projection.index)?;
                if !value.is_null() {
                    require_numeric(kind, value)?;
                    *total = Some(match total {
                        Some(acc) => add(kind, acc, value)?,
                        None => value.clone(),
                    });
                }
            }
            AggregationUnit::Min(best) | AggregationUnit::Max(best) => {
                let value = cell(projection.index)?;
                if !value.is_null() {
                    let wanted = if kind == AggregationKind::Min {
                        Ordering::Less
                    } else {
                        Ordering::Greater
                    };
                    let replace = match best {
                        None => true,
                        Some(current) => {
                            value.try_compare(current).ok_or_else(|| type_error(kind, value))? == wanted
                        }
                    };
                    if replace {
                        *best = Some(value.clone());
                    }
                }
            }
            AggregationUnit::Avg { count, sum } => {
                let (count_index, sum_index) =
                    match (projection.derived_count_index, projection.derived_sum_index) {
                        (Some(c), Some(s)) => (c, s),
                        _ => {
                            return Err(Error::AggregationType {
                                function: kind.name().to_string(),
                                value_type: "missing derived SUM/COUNT columns".to_string(),
                            })
                        }
                    };
                let partial_count = cell(count_index)?;
                let partial_sum = cell(sum_index)?;
                if !partial_count.is_null() {
                    require_numeric(kind, partial_count)?;
                    *count = add(kind, count, partial_count)?;
                }
                if !partial_sum.is_null() {
                    require_numeric(kind, partial_sum)?;
                    *sum = Some(match sum {
                        Some(acc) => add(kind, acc, partial_sum)?,
                        None => partial_sum.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn result(&self) -> Value {
        match self {
            AggregationUnit::Count(total) => total.clone(),
            AggregationUnit::Sum(total) | AggregationUnit::Min(total) | AggregationUnit::Max(total) => {
                total.clone().unwrap_or(Value::Null)
            }
            AggregationUnit::Avg { count, sum } => {
                match (sum.as_ref().and_then(Value::as_f64), count.as_f64()) {
                    (Some(s), Some(c)) if c != 0.0 => Value::Float(s / c),
                    _ => Value::Null,
                }
            }
        }
    }

    /// Write the recombined values into an output row, including AVG's derived columns.
    pub fn write_into(&self, projection: &AggregationProjection, row: &mut [Value]) {
        if let Some(slot) = row.get_mut(projection.index) {
            *slot = self.result();
        }
        if let AggregationUnit::Avg { count, sum } = self {
            if let Some(slot) = projection.derived_count_index.and_then(|i| row.get_mut(i)) {
                *slot = count.clone();
            }
            if let Some(slot) = projection.derived_sum_index.and_then(|i| row.get_mut(i)) {
                *slot = sum.clone().unwrap_or(Value::Null);
            }
        }
    }
}

/// One unit per aggregate projection of a group.
#[derive(Debug, Clone)]
pub struct GroupAggregation {
    units: Vec<AggregationUnit>,
}

impl GroupAggregation {
    pub fn new(projections: &[AggregationProjection]) -> Self {
        Self {
            units: projections.iter().map(|p| AggregationUnit::new(p.kind)).collect(),
        }
    }

    pub fn merge(&mut self, projections: &[AggregationProjection], row: &[Value]) -> Result<()> {
        for (unit, projection) in self.units.iter_mut().zip(projections) {
            unit.merge(projection, row)?;
        }
        Ok(())
    }

    pub fn write_into(&self, projections: &[AggregationProjection], row: &mut [Value]) {
        for (unit, projection) in self.units.iter().zip(projections) {
            unit.write_into(projection, row);
        }
    }
}
