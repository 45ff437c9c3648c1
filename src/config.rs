//! Sharding configuration
//!
//! Serde models for the sharding rule and runtime properties, loaded from JSON
//! and validated before a [`crate::rule::ShardingRule`] is built from them.

use crate::error::{Error, ErrorContext, Result};
use crate::rule::data_node::DataNode;
use crate::rule::TableRule;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Physical data source declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Data source name referenced by data nodes
    pub name: String,
    /// Database instance hosting this data source; `None` means its own instance
    #[serde(default)]
    pub instance: Option<String>,
}

impl DataSourceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: None,
        }
    }

    pub fn on_instance(name: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: Some(instance.into()),
        }
    }
}

/// Built-in sharding algorithms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlgorithmConfig {
    Mod { sharding_count: u64 },
    HashMod { sharding_count: u64 },
    BoundaryRange { boundaries: Vec<i64> },
    /// Time-bucketed tables: one target per `datetime_interval_amount` units
    /// starting at `datetime_lower`, named by `sharding_suffix_pattern`.
    Interval {
        datetime_lower: String,
        datetime_upper: String,
        /// chrono format for the bounds and for text sharding values
        #[serde(default = "default_datetime_pattern")]
        datetime_pattern: String,
        /// chrono format of the target suffix; `%Q` is the two-digit quarter
        sharding_suffix_pattern: String,
        #[serde(default = "default_interval_amount")]
        datetime_interval_amount: u32,
        #[serde(default)]
        datetime_interval_unit: IntervalUnit,
    },
}

fn default_datetime_pattern() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

fn default_interval_amount() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntervalUnit {
    Hours,
    #[default]
    Days,
    Months,
    Quarters,
    Years,
}

/// Sharding column plus the algorithm applied to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardingStrategyConfig {
    pub column: String,
    pub algorithm: AlgorithmConfig,
}

/// Snowflake key generation for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyGenerateConfig {
    pub column: String,
    #[serde(default)]
    pub worker_id: u16,
    /// Clock regression tolerated before key generation fails
    #[serde(default = "default_max_tolerate_time_difference_ms")]
    pub max_tolerate_time_difference_ms: u64,
}

fn default_max_tolerate_time_difference_ms() -> u64 {
    10
}

/// Per logic table configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRuleConfig {
    pub logic_table: String,
    /// Inline expression such as `ds_${0..1}.t_order_${0..1}`
    pub actual_data_nodes: String,
    #[serde(default)]
    pub database_strategy: Option<ShardingStrategyConfig>,
    #[serde(default)]
    pub table_strategy: Option<ShardingStrategyConfig>,
    #[serde(default)]
    pub key_generate: Option<KeyGenerateConfig>,
}

/// Complete sharding rule configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardingRuleConfig {
    pub data_sources: Vec<DataSourceConfig>,
    #[serde(default)]
    pub tables: Vec<TableRuleConfig>,
    /// Groups of tables sharded identically and joined on their sharding column
    #[serde(default)]
    pub binding_tables: Vec<Vec<String>>,
    /// Tables replicated on every data source
    #[serde(default)]
    pub broadcast_tables: Vec<String>,
    #[serde(default)]
    pub default_database_strategy: Option<ShardingStrategyConfig>,
    #[serde(default)]
    pub default_table_strategy: Option<ShardingStrategyConfig>,
    /// Data source for tables without a rule
    #[serde(default)]
    pub default_data_source: Option<String>,
}

impl ShardingRuleConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(Error::from)
            .with_context(|| format!("Failed to read sharding config {}", path.display()))?;
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_sources.is_empty() {
            return Err(Error::Config("At least one data source is required".to_string()));
        }
        let mut names = HashSet::new();
        for ds in &self.data_sources {
            if !names.insert(ds.name.as_str()) {
                return Err(Error::Config(format!("Duplicate data source '{}'", ds.name)));
            }
        }

        if let Some(default) = &self.default_data_source {
            if !names.contains(default.as_str()) {
                return Err(Error::Config(format!(
                    "Default data source '{}' is not declared",
                    default
                )));
            }
        }

        let mut layouts = std::collections::HashMap::new();
        for table in &self.tables {
            let nodes = DataNode::parse_inline(&table.actual_data_nodes)?;
            if nodes.is_empty() {
                return Err(Error::Config(format!(
                    "Table '{}' has no actual data nodes",
                    table.logic_table
                )));
            }
            if let Some(unknown) = nodes.iter().find(|n| !names.contains(n.data_source.as_str())) {
                return Err(Error::Config(format!(
                    "Table '{}' references unknown data source in '{}'",
                    table.logic_table, unknown
                )));
            }
            let rule = TableRule::new(table.logic_table.as_str(), nodes);
            layouts.insert(rule.logic_table().to_string(), rule.layout());
        }

        for group in &self.binding_tables {
            let mut expected: Option<&Vec<(String, usize)>> = None;
            for table in group {
                let layout = layouts.get(&table.to_lowercase()).ok_or_else(|| {
                    Error::Config(format!("Binding table '{}' has no table rule", table))
                })?;
                match expected {
                    None => expected = Some(layout),
                    Some(first) if first != layout => {
                        return Err(Error::Config(format!(
                            "Binding tables {:?} do not share the same data node layout",
                            group
                        )))
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }
}

/// Route cache tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteCacheConfig {
    pub enabled: bool,
    pub initial_capacity: usize,
    pub maximum_size: usize,
    /// Longer SQL bypasses the cache
    pub max_sql_length: usize,
}

impl Default for RouteCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_capacity: 128,
            maximum_size: 1024,
            max_sql_length: 512,
        }
    }
}

/// Runtime properties of the routing core
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingProps {
    /// Log every route decision at INFO
    pub sql_show: bool,
    pub route_cache: RouteCacheConfig,
}

impl ShardingProps {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
