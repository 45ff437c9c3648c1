use crate::config::IntervalUnit;
use crate::error::{Error, Result};
use crate::value::Value;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use std::fmt;
use std::fmt::Write as _;
use std::ops::Bound;
use std::sync::Arc;

/// A resolved range predicate on a sharding column.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub lower: Bound<Value>,
    pub upper: Bound<Value>,
}

impl ValueRange {
    pub fn new(lower: Bound<Value>, upper: Bound<Value>) -> Self {
        Self { lower, upper }
    }

    pub fn closed(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::new(Bound::Included(low.into()), Bound::Included(high.into()))
    }

    /// Inclusive integer bounds, `None` on an unbounded side.
    pub fn integer_bounds(&self) -> Result<(Option<i64>, Option<i64>)> {
        let as_int = |v: &Value| {
            v.as_i64().ok_or_else(|| {
                Error::ShardingAlgorithm(format!(
                    "Range bound {} is not an integer ({})",
                    v,
                    v.type_name()
                ))
            })
        };
        let low = match &self.lower {
            Bound::Included(v) => Some(as_int(v)?),
            Bound::Excluded(v) => Some(as_int(v)?.saturating_add(1)),
            Bound::Unbounded => None,
        };
        let high = match &self.upper {
            Bound::Included(v) => Some(as_int(v)?),
            Bound::Excluded(v) => Some(as_int(v)?.saturating_sub(1)),
            Bound::Unbounded => None,
        };
        Ok((low, high))
    }
}

/// Values bound to one sharding column, already resolved against runtime parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ShardingValue {
    List(Vec<Value>),
    Range(ValueRange),
}

/// Maps sharding values onto a subset of the available target names
/// (data source names or actual table names).
pub trait ShardingAlgorithm: Send + Sync + fmt::Debug {
    fn algorithm_type(&self) -> &'static str;

    /// Target for a single `=`/`IN` value.
    fn shard_exact(&self, targets: &[String], value: &Value) -> Result<String>;

    /// Targets covering a range predicate.
    fn shard_range(&self, targets: &[String], range: &ValueRange) -> Result<Vec<String>>;
}

/// Trailing decimal suffix of a target name: `t_order_12` -> 12.
pub fn target_suffix(target: &str) -> Option<u64> {
    let digits = target
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    target[target.len() - digits..].parse().ok()
}

fn find_target_by_suffix(targets: &[String], suffix: u64) -> Option<&String> {
    targets.iter().find(|t| target_suffix(t) == Some(suffix))
}

fn require_integer(algorithm: &str, value: &Value) -> Result<i64> {
    value.as_i64().ok_or_else(|| {
        Error::ShardingAlgorithm(format!(
            "{} sharding requires an integer value, got {} ({})",
            algorithm,
            value,
            value.type_name()
        ))
    })
}

/// `value % sharding_count` selects the target whose name ends with that number.
#[derive(Debug, Clone)]
pub struct ModShardingAlgorithm {
    sharding_count: u64,
}

impl ModShardingAlgorithm {
    pub fn new(sharding_count: u64) -> Result<Self> {
        if sharding_count == 0 {
            return Err(Error::Config("MOD sharding-count must be positive".to_string()));
        }
        Ok(Self { sharding_count })
    }
}

impl ShardingAlgorithm for ModShardingAlgorithm {
    fn algorithm_type(&self) -> &'static str {
        "MOD"
    }

    fn shard_exact(&self, targets: &[String], value: &Value) -> Result<String> {
        let v = require_integer("MOD", value)?;
        let suffix = v.rem_euclid(self.sharding_count as i64) as u64;
        find_target_by_suffix(targets, suffix).cloned().ok_or_else(|| {
            Error::ShardingAlgorithm(format!(
                "MOD sharding produced suffix {} which matches none of {:?}",
                suffix, targets
            ))
        })
    }

    fn shard_range(&self, targets: &[String], range: &ValueRange) -> Result<Vec<String>> {
        let (low, high) = match range.integer_bounds()? {
            (Some(low), Some(high)) => (low, high),
            _ => return Ok(targets.to_vec()),
        };
        if high < low {
            return Ok(Vec::new());
        }
        if high.abs_diff(low) >= self.sharding_count - 1 {
            return Ok(targets.to_vec());
        }
        let mut result = Vec::new();
        for v in low..=high {
            let target = self.shard_exact(targets, &Value::Int(v))?;
            if !result.contains(&target) {
                result.push(target);
            }
        }
        Ok(result)
    }
}

/// Stable CRC32 hash of the value modulo `sharding_count`.
#[derive(Debug, Clone)]
pub struct HashModShardingAlgorithm {
    sharding_count: u64,
}

impl HashModShardingAlgorithm {
    pub fn new(sharding_count: u64) -> Result<Self> {
        if sharding_count == 0 {
            return Err(Error::Config(
                "HASH_MOD sharding-count must be positive".to_string(),
            ));
        }
        Ok(Self { sharding_count })
    }

    fn hash_value(value: &Value) -> Result<u32> {
        let mut hasher = crc32fast::Hasher::new();
        match value {
            Value::Null => {
                return Err(Error::ShardingAlgorithm(
                    "HASH_MOD sharding cannot route a NULL value".to_string(),
                ))
            }
            Value::Bool(v) => hasher.update(&[*v as u8]),
            Value::Int(v) | Value::Timestamp(v) => hasher.update(&v.to_le_bytes()),
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => {
                hasher.update(&(*v as i64).to_le_bytes())
            }
            Value::Float(v) => hasher.update(&v.to_bits().to_le_bytes()),
            Value::Text(v) => hasher.update(v.as_bytes()),
            Value::Bytes(v) => hasher.update(v),
        }
        Ok(hasher.finalize())
    }
}

impl ShardingAlgorithm for HashModShardingAlgorithm {
    fn algorithm_type(&self) -> &'static str {
        "HASH_MOD"
    }

    fn shard_exact(&self, targets: &[String], value: &Value) -> Result<String> {
        let suffix = Self::hash_value(value)? as u64 % self.sharding_count;
        find_target_by_suffix(targets, suffix).cloned().ok_or_else(|| {
            Error::ShardingAlgorithm(format!(
                "HASH_MOD sharding produced suffix {} which matches none of {:?}",
                suffix, targets
            ))
        })
    }

    fn shard_range(&self, targets: &[String], _range: &ValueRange) -> Result<Vec<String>> {
        // Hashing destroys ordering, every target may hold part of the range
        Ok(targets.to_vec())
    }
}

/// Partition `i` covers `[boundaries[i-1], boundaries[i])`; the first partition is open
/// below and the last open above, so `n` boundaries give `n + 1` partitions.
#[derive(Debug, Clone)]
pub struct BoundaryRangeShardingAlgorithm {
    boundaries: Vec<i64>,
}

impl BoundaryRangeShardingAlgorithm {
    pub fn new(boundaries: Vec<i64>) -> Result<Self> {
        if boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Config(
                "BOUNDARY_RANGE boundaries must be strictly ascending".to_string(),
            ));
        }
        Ok(Self { boundaries })
    }

    fn partition_of(&self, v: i64) -> u64 {
        self.boundaries.partition_point(|b| *b <= v) as u64
    }

    fn target(&self, targets: &[String], partition: u64) -> Result<String> {
        find_target_by_suffix(targets, partition).cloned().ok_or_else(|| {
            Error::ShardingAlgorithm(format!(
                "BOUNDARY_RANGE partition {} matches none of {:?}",
                partition, targets
            ))
        })
    }
}

impl ShardingAlgorithm for BoundaryRangeShardingAlgorithm {
    fn algorithm_type(&self) -> &'static str {
        "BOUNDARY_RANGE"
    }

    fn shard_exact(&self, targets: &[String], value: &Value) -> Result<String> {
        let v = require_integer("BOUNDARY_RANGE", value)?;
        self.target(targets, self.partition_of(v))
    }

    fn shard_range(&self, targets: &[String], range: &ValueRange) -> Result<Vec<String>> {
        let (low, high) = range.integer_bounds()?;
        let first = low.map(|v| self.partition_of(v)).unwrap_or(0);
        let last = high
            .map(|v| self.partition_of(v))
            .unwrap_or(self.boundaries.len() as u64);
        if last < first {
            return Ok(Vec::new());
        }
        (first..=last).map(|p| self.target(targets, p)).collect()
    }
}

fn parse_datetime(text: &str, pattern: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, pattern).ok().or_else(|| {
        NaiveDate::parse_from_str(text, pattern)
            .ok()
            .map(|date| date.and_time(NaiveTime::MIN))
    })
}

fn is_valid_pattern(pattern: &str) -> bool {
    !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
}

/// Buckets time into consecutive intervals of `amount` units, starting at
/// `lower` and opening no interval after `upper`. An interval routes to every
/// target whose name ends with its start formatted by the suffix pattern.
///
/// Sharding values are `Timestamp`s (read as UTC) or text in `datetime_pattern`.
#[derive(Debug, Clone)]
pub struct IntervalShardingAlgorithm {
    lower: NaiveDateTime,
    upper: NaiveDateTime,
    datetime_pattern: String,
    suffix_pattern: String,
    amount: u32,
    unit: IntervalUnit,
}

impl IntervalShardingAlgorithm {
    pub fn new(
        lower: &str,
        upper: &str,
        datetime_pattern: impl Into<String>,
        suffix_pattern: impl Into<String>,
        amount: u32,
        unit: IntervalUnit,
    ) -> Result<Self> {
        let datetime_pattern = datetime_pattern.into();
        let suffix_pattern = suffix_pattern.into();
        if amount == 0 {
            return Err(Error::Config(
                "INTERVAL datetime-interval-amount must be positive".to_string(),
            ));
        }
        if !is_valid_pattern(&datetime_pattern) || !is_valid_pattern(&suffix_pattern.replace("%Q", "00")) {
            return Err(Error::Config(format!(
                "Invalid INTERVAL pattern '{}' or '{}'",
                datetime_pattern, suffix_pattern
            )));
        }
        let parse = |text: &str| {
            parse_datetime(text, &datetime_pattern).ok_or_else(|| {
                Error::Config(format!(
                    "INTERVAL bound '{}' does not match pattern '{}'",
                    text, datetime_pattern
                ))
            })
        };
        let (lower, upper) = (parse(lower)?, parse(upper)?);
        if upper < lower {
            return Err(Error::Config(format!(
                "INTERVAL datetime-upper {} precedes datetime-lower {}",
                upper, lower
            )));
        }
        Ok(Self {
            lower,
            upper,
            datetime_pattern,
            suffix_pattern,
            amount,
            unit,
        })
    }

    fn datetime_of(&self, value: &Value) -> Result<NaiveDateTime> {
        let parsed = match value {
            Value::Timestamp(micros) => DateTime::from_timestamp_micros(*micros).map(|dt| dt.naive_utc()),
            Value::Text(text) => parse_datetime(text, &self.datetime_pattern),
            other => {
                return Err(Error::ShardingAlgorithm(format!(
                    "INTERVAL sharding requires a timestamp or text value, got {} ({})",
                    other,
                    other.type_name()
                )))
            }
        };
        parsed.ok_or_else(|| {
            Error::ShardingAlgorithm(format!(
                "INTERVAL sharding cannot read {} as a datetime in '{}'",
                value, self.datetime_pattern
            ))
        })
    }

    fn datetime_bound(&self, bound: &Bound<Value>) -> Result<Bound<NaiveDateTime>> {
        Ok(match bound {
            Bound::Included(v) => Bound::Included(self.datetime_of(v)?),
            Bound::Excluded(v) => Bound::Excluded(self.datetime_of(v)?),
            Bound::Unbounded => Bound::Unbounded,
        })
    }

    /// Start of the interval after the one starting at `start`.
    fn step(&self, start: NaiveDateTime) -> Option<NaiveDateTime> {
        match self.unit {
            IntervalUnit::Hours => start.checked_add_signed(TimeDelta::try_hours(i64::from(self.amount))?),
            IntervalUnit::Days => start.checked_add_days(Days::new(u64::from(self.amount))),
            IntervalUnit::Months => start.checked_add_months(Months::new(self.amount)),
            IntervalUnit::Quarters => start.checked_add_months(Months::new(self.amount.checked_mul(3)?)),
            IntervalUnit::Years => start.checked_add_months(Months::new(self.amount.checked_mul(12)?)),
        }
    }

    fn suffix(&self, start: NaiveDateTime) -> Result<String> {
        let quarter = format!("{:02}", start.month0() / 3 + 1);
        let pattern = self.suffix_pattern.replace("%Q", &quarter);
        let mut suffix = String::new();
        write!(suffix, "{}", start.format(&pattern)).map_err(|_| {
            Error::ShardingAlgorithm(format!("Cannot format {} with '{}'", start, pattern))
        })?;
        Ok(suffix)
    }
}

impl ShardingAlgorithm for IntervalShardingAlgorithm {
    fn algorithm_type(&self) -> &'static str {
        "INTERVAL"
    }

    fn shard_exact(&self, targets: &[String], value: &Value) -> Result<String> {
        let routed = self.shard_range(targets, &ValueRange::closed(value.clone(), value.clone()))?;
        routed.into_iter().next().ok_or_else(|| {
            Error::ShardingAlgorithm(format!(
                "INTERVAL sharding found no target for {} among {:?}",
                value, targets
            ))
        })
    }

    fn shard_range(&self, targets: &[String], range: &ValueRange) -> Result<Vec<String>> {
        let lower = self.datetime_bound(&range.lower)?;
        let upper = self.datetime_bound(&range.upper)?;
        let mut result: Vec<String> = Vec::new();
        let mut start = self.lower;
        while start <= self.upper {
            let before_upper = match upper {
                Bound::Included(u) => start <= u,
                Bound::Excluded(u) => start < u,
                Bound::Unbounded => true,
            };
            if !before_upper {
                break;
            }
            let end = self.step(start);
            let after_lower = match (lower, end) {
                (Bound::Included(l) | Bound::Excluded(l), Some(end)) => end > l,
                _ => true,
            };
            if after_lower {
                let suffix = self.suffix(start)?;
                for target in targets.iter().filter(|t| t.ends_with(&suffix)) {
                    if !result.contains(target) {
                        result.push(target.clone());
                    }
                }
            }
            match end {
                Some(end) => start = end,
                None => break,
            }
        }
        Ok(result)
    }
}

/// A sharding column bound to the algorithm that shards on it.
#[derive(Clone)]
pub struct ShardingStrategy {
    column: String,
    algorithm: Arc<dyn ShardingAlgorithm>,
}

impl fmt::Debug for ShardingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardingStrategy")
            .field("column", &self.column)
            .field("algorithm", &self.algorithm.algorithm_type())
            .finish()
    }
}

impl ShardingStrategy {
    pub fn new(column: impl Into<String>, algorithm: Arc<dyn ShardingAlgorithm>) -> Self {
        Self {
            column: column.into(),
            algorithm,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn is_sharding_column(&self, column: &str) -> bool {
        self.column.eq_ignore_ascii_case(column)
    }

    pub fn algorithm(&self) -> &Arc<dyn ShardingAlgorithm> {
        &self.algorithm
    }

    /// Route `values` onto `targets`. Several values on the same column are
    /// AND-ed, so their target sets intersect. No values means every target.
    pub fn do_sharding(&self, targets: &[String], values: &[ShardingValue]) -> Result<Vec<String>> {
        if values.is_empty() {
            return Ok(targets.to_vec());
        }
        let mut selected: Option<Vec<String>> = None;
        for value in values {
            let routed = match value {
                ShardingValue::List(items) => {
                    let mut routed = Vec::with_capacity(items.len());
                    for item in items {
                        let target = self.algorithm.shard_exact(targets, item)?;
                        if !routed.contains(&target) {
                            routed.push(target);
                        }
                    }
                    routed
                }
                ShardingValue::Range(range) => self.algorithm.shard_range(targets, range)?,
            };
            if let Some(unknown) = routed.iter().find(|t| !targets.contains(t)) {
                return Err(Error::ShardingAlgorithm(format!(
                    "{} algorithm returned unknown target '{}'",
                    self.algorithm.algorithm_type(),
                    unknown
                )));
            }
            selected = Some(match selected {
                None => routed,
                Some(previous) => previous.into_iter().filter(|t| routed.contains(t)).collect(),
            });
        }
        let selected = selected.unwrap_or_default();
        // Keep configuration order regardless of the order values appeared in
        Ok(targets
            .iter()
            .filter(|t| selected.contains(t))
            .cloned()
            .collect())
    }
}
