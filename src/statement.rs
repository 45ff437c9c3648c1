//! Bound statement shape
//!
//! The routing and merging engines never parse SQL. An external binder hands
//! them a [`StatementShape`] describing the statement kind, the logic tables,
//! the sharding predicates and the ordering/grouping/pagination of the query.

use crate::error::{Error, Result};
use crate::rule::{ShardingValue, ValueRange};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::ops::Bound;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DdlKind {
    Table,
    Index,
    FunctionOrProcedure,
    Tablespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DalKind {
    Set,
    ShowDatabases,
    ShowTables,
    ShowCreateTable,
    Describe,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl(DdlKind),
    Dcl,
    Tcl,
    Dal(DalKind),
}

impl StatementKind {
    pub fn is_dml(&self) -> bool {
        matches!(
            self,
            StatementKind::Select | StatementKind::Insert | StatementKind::Update | StatementKind::Delete
        )
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete
        )
    }
}

/// A literal or a `?` marker bound at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Literal(Value),
    Parameter(usize),
}

impl Operand {
    pub fn resolve(&self, params: &[Value]) -> Result<Value> {
        match self {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Parameter(index) => {
                params
                    .get(*index)
                    .cloned()
                    .ok_or(Error::ParameterIndexOutOfRange {
                        index: *index,
                        count: params.len(),
                    })
            }
        }
    }

    pub fn parameter_index(&self) -> Option<usize> {
        match self {
            Operand::Parameter(index) => Some(*index),
            Operand::Literal(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    /// `=` or `IN`
    List(Vec<Operand>),
    /// `BETWEEN`, `<`, `>=` ...
    Range {
        lower: Bound<Operand>,
        upper: Bound<Operand>,
    },
}

fn resolve_bound(bound: &Bound<Operand>, params: &[Value]) -> Result<Bound<Value>> {
    Ok(match bound {
        Bound::Included(operand) => Bound::Included(operand.resolve(params)?),
        Bound::Excluded(operand) => Bound::Excluded(operand.resolve(params)?),
        Bound::Unbounded => Bound::Unbounded,
    })
}

fn bound_operand(bound: &Bound<Operand>) -> Option<&Operand> {
    match bound {
        Bound::Included(operand) | Bound::Excluded(operand) => Some(operand),
        Bound::Unbounded => None,
    }
}

/// One predicate on a sharding column.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardingConditionValue {
    pub table: String,
    pub column: String,
    pub value: ConditionValue,
}

impl ShardingConditionValue {
    pub fn equal(table: &str, column: &str, operand: Operand) -> Self {
        Self::list(table, column, vec![operand])
    }

    pub fn list(table: &str, column: &str, operands: Vec<Operand>) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            value: ConditionValue::List(operands),
        }
    }

    pub fn range(table: &str, column: &str, lower: Bound<Operand>, upper: Bound<Operand>) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            value: ConditionValue::Range { lower, upper },
        }
    }

    pub fn resolve(&self, params: &[Value]) -> Result<ShardingValue> {
        match &self.value {
            ConditionValue::List(operands) => Ok(ShardingValue::List(
                operands
                    .iter()
                    .map(|o| o.resolve(params))
                    .collect::<Result<Vec<_>>>()?,
            )),
            ConditionValue::Range { lower, upper } => Ok(ShardingValue::Range(ValueRange::new(
                resolve_bound(lower, params)?,
                resolve_bound(upper, params)?,
            ))),
        }
    }

    pub fn operands(&self) -> Vec<&Operand> {
        match &self.value {
            ConditionValue::List(operands) => operands.iter().collect(),
            ConditionValue::Range { lower, upper } => bound_operand(lower)
                .into_iter()
                .chain(bound_operand(upper))
                .collect(),
        }
    }

    pub fn is_single_equality(&self) -> bool {
        matches!(&self.value, ConditionValue::List(operands) if operands.len() == 1)
    }
}

/// Predicates AND-ed together; separate conditions are OR branches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingCondition {
    pub values: Vec<ShardingConditionValue>,
}

impl ShardingCondition {
    pub fn new(values: Vec<ShardingConditionValue>) -> Self {
        Self { values }
    }

    /// Resolved values for `column` on any of `tables`.
    pub fn values_for(
        &self,
        tables: &[String],
        column: &str,
        params: &[Value],
    ) -> Result<Vec<ShardingValue>> {
        self.values
            .iter()
            .filter(|v| {
                v.column.eq_ignore_ascii_case(column)
                    && tables.iter().any(|t| t.eq_ignore_ascii_case(&v.table))
            })
            .map(|v| v.resolve(params))
            .collect()
    }

    /// Every operand resolvable against `params`.
    pub fn check_parameters(&self, params: &[Value]) -> Result<()> {
        for value in &self.values {
            for operand in value.operands() {
                operand.resolve(params)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullOrder {
    First,
    Last,
}

/// ORDER BY or GROUP BY item, addressed by result column index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub index: usize,
    pub direction: OrderDirection,
    pub nulls: NullOrder,
    pub case_sensitive: bool,
}

impl OrderByItem {
    /// NULL sorts as the smallest value unless overridden.
    pub fn asc(index: usize) -> Self {
        Self {
            index,
            direction: OrderDirection::Asc,
            nulls: NullOrder::First,
            case_sensitive: true,
        }
    }

    pub fn desc(index: usize) -> Self {
        Self {
            index,
            direction: OrderDirection::Desc,
            nulls: NullOrder::Last,
            case_sensitive: true,
        }
    }

    pub fn nulls(mut self, nulls: NullOrder) -> Self {
        self.nulls = nulls;
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    /// Same column and ordering, ignoring NULL placement.
    pub fn same_key(&self, other: &OrderByItem) -> bool {
        self.index == other.index
            && self.direction == other.direction
            && self.case_sensitive == other.case_sensitive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationKind {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregationKind {
    pub fn name(&self) -> &'static str {
        match self {
            AggregationKind::Count => "COUNT",
            AggregationKind::Sum => "SUM",
            AggregationKind::Min => "MIN",
            AggregationKind::Max => "MAX",
            AggregationKind::Avg => "AVG",
        }
    }
}

/// Aggregate projection. AVG carries the indexes of the SUM and COUNT columns the
/// rewriter derived for it, so the average can be rebuilt across shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationProjection {
    pub kind: AggregationKind,
    pub index: usize,
    pub derived_count_index: Option<usize>,
    pub derived_sum_index: Option<usize>,
}

impl AggregationProjection {
    pub fn new(kind: AggregationKind, index: usize) -> Self {
        Self {
            kind,
            index,
            derived_count_index: None,
            derived_sum_index: None,
        }
    }

    pub fn avg(index: usize, derived_count_index: usize, derived_sum_index: usize) -> Self {
        Self {
            kind: AggregationKind::Avg,
            index,
            derived_count_index: Some(derived_count_index),
            derived_sum_index: Some(derived_sum_index),
        }
    }

    pub fn column_indexes(&self) -> impl Iterator<Item = usize> {
        std::iter::once(self.index)
            .chain(self.derived_count_index)
            .chain(self.derived_sum_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: u64,
    pub limit: Option<u64>,
}

impl Pagination {
    pub fn new(offset: u64, limit: Option<u64>) -> Self {
        Self { offset, limit }
    }
}

/// Everything routing and merging need to know about one bound statement.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementShape {
    pub kind: StatementKind,
    pub sql: String,
    /// Referenced logic tables in statement order, lowercased.
    pub tables: Vec<String>,
    /// OR branches of sharding predicates.
    pub conditions: Vec<ShardingCondition>,
    pub order_by: Vec<OrderByItem>,
    pub group_by: Vec<OrderByItem>,
    pub aggregations: Vec<AggregationProjection>,
    pub pagination: Option<Pagination>,
    /// Expected column count of every shard result.
    pub projection_count: Option<usize>,
    /// Rows of a multi-row INSERT; one otherwise.
    pub insert_rows: usize,
}

impl StatementShape {
    pub fn new(kind: StatementKind, sql: impl Into<String>) -> Self {
        Self {
            kind,
            sql: sql.into(),
            tables: Vec::new(),
            conditions: Vec::new(),
            order_by: Vec::new(),
            group_by: Vec::new(),
            aggregations: Vec::new(),
            pagination: None,
            projection_count: None,
            insert_rows: 1,
        }
    }

    pub fn select(sql: impl Into<String>) -> Self {
        Self::new(StatementKind::Select, sql)
    }

    pub fn with_tables(mut self, tables: &[&str]) -> Self {
        self.tables = tables.iter().map(|t| t.to_lowercase()).collect();
        self
    }

    pub fn with_condition(mut self, condition: ShardingCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_order_by(mut self, items: Vec<OrderByItem>) -> Self {
        self.order_by = items;
        self
    }

    pub fn with_group_by(mut self, items: Vec<OrderByItem>) -> Self {
        self.group_by = items;
        self
    }

    pub fn with_aggregations(mut self, aggregations: Vec<AggregationProjection>) -> Self {
        self.aggregations = aggregations;
        self
    }

    pub fn with_pagination(mut self, offset: u64, limit: Option<u64>) -> Self {
        self.pagination = Some(Pagination::new(offset, limit));
        self
    }

    pub fn with_projection_count(mut self, count: usize) -> Self {
        self.projection_count = Some(count);
        self
    }

    pub fn with_insert_rows(mut self, rows: usize) -> Self {
        self.insert_rows = rows;
        self
    }

    pub fn has_grouping(&self) -> bool {
        !self.group_by.is_empty() || !self.aggregations.is_empty()
    }

    /// Order-by items equal the group-by items, so groups arrive contiguously.
    pub fn group_by_matches_order_by(&self) -> bool {
        self.order_by.is_empty()
            || (self.order_by.len() == self.group_by.len()
                && self
                    .order_by
                    .iter()
                    .zip(&self.group_by)
                    .all(|(o, g)| o.same_key(g)))
    }

    /// Ordinal parameter positions referenced by sharding predicates, ascending.
    pub fn sharding_parameter_indexes(&self) -> Vec<usize> {
        let mut indexes: Vec<usize> = self
            .conditions
            .iter()
            .flat_map(|c| c.values.iter())
            .flat_map(|v| v.operands())
            .filter_map(Operand::parameter_index)
            .collect();
        indexes.sort_unstable();
        indexes.dedup();
        indexes
    }
}
