pub mod algorithm;
pub mod data_node;
pub mod keygen;
pub mod table;

pub use algorithm::{
    BoundaryRangeShardingAlgorithm, HashModShardingAlgorithm, IntervalShardingAlgorithm,
    ModShardingAlgorithm, ShardingAlgorithm, ShardingStrategy, ShardingValue, ValueRange,
};
pub use data_node::DataNode;
pub use keygen::{KeyGenerator, SnowflakeKeyGenerator};
pub use table::{KeyGenerateStrategy, TableRule};

use crate::config::{AlgorithmConfig, ShardingRuleConfig, ShardingStrategyConfig};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Read-only sharding configuration consulted by routing and merging.
#[derive(Debug, Clone, Default)]
pub struct ShardingRule {
    data_source_names: Vec<String>,
    instances: HashMap<String, String>,
    table_rules: HashMap<String, TableRule>,
    binding_groups: Vec<Vec<String>>,
    broadcast_tables: Vec<String>,
    default_database_strategy: Option<ShardingStrategy>,
    default_table_strategy: Option<ShardingStrategy>,
    default_data_source: Option<String>,
}

impl ShardingRule {
    pub fn new(data_source_names: Vec<String>) -> Self {
        Self {
            data_source_names,
            ..Self::default()
        }
    }

    pub fn with_table_rule(mut self, rule: TableRule) -> Self {
        self.table_rules.insert(rule.logic_table().to_string(), rule);
        self
    }

    /// Broadcast tables get a rule placing them, under their own name, on every data source.
    pub fn with_broadcast_table(mut self, table: &str) -> Self {
        let table = table.to_lowercase();
        if !self.broadcast_tables.contains(&table) {
            let rule = TableRule::broadcast(table.clone(), &self.data_source_names);
            self.table_rules.insert(table.clone(), rule);
            self.broadcast_tables.push(table);
        }
        self
    }

    pub fn with_binding_group(mut self, tables: &[&str]) -> Self {
        self.binding_groups
            .push(tables.iter().map(|t| t.to_lowercase()).collect());
        self
    }

    pub fn with_default_database_strategy(mut self, strategy: Option<ShardingStrategy>) -> Self {
        self.default_database_strategy = strategy;
        self
    }

    pub fn with_default_table_strategy(mut self, strategy: Option<ShardingStrategy>) -> Self {
        self.default_table_strategy = strategy;
        self
    }

    pub fn with_default_data_source(mut self, data_source: Option<String>) -> Self {
        self.default_data_source = data_source;
        self
    }

    pub fn with_instance(mut self, data_source: &str, instance: &str) -> Self {
        self.instances
            .insert(data_source.to_string(), instance.to_string());
        self
    }

    pub fn from_config(config: &ShardingRuleConfig) -> Result<Self> {
        config.validate()?;
        let mut rule = Self::new(config.data_sources.iter().map(|ds| ds.name.clone()).collect());
        for ds in &config.data_sources {
            if let Some(instance) = &ds.instance {
                rule = rule.with_instance(&ds.name, instance);
            }
        }
        rule = rule
            .with_default_database_strategy(build_strategy(config.default_database_strategy.as_ref())?)
            .with_default_table_strategy(build_strategy(config.default_table_strategy.as_ref())?)
            .with_default_data_source(config.default_data_source.clone());

        for table in &config.tables {
            let key_generate = match &table.key_generate {
                Some(key) => Some(KeyGenerateStrategy {
                    column: key.column.clone(),
                    generator: Arc::new(SnowflakeKeyGenerator::new(
                        key.worker_id,
                        key.max_tolerate_time_difference_ms,
                    )?),
                }),
                None => None,
            };
            let table_rule = TableRule::new(
                table.logic_table.clone(),
                DataNode::parse_inline(&table.actual_data_nodes)?,
            )
            .with_database_strategy(build_strategy(table.database_strategy.as_ref())?)
            .with_table_strategy(build_strategy(table.table_strategy.as_ref())?)
            .with_key_generate(key_generate);
            rule = rule.with_table_rule(table_rule);
        }
        for table in &config.broadcast_tables {
            rule = rule.with_broadcast_table(table);
        }
        for group in &config.binding_tables {
            let group: Vec<&str> = group.iter().map(String::as_str).collect();
            rule = rule.with_binding_group(&group);
        }
        debug!(
            "Built sharding rule: {} data sources, {} table rules, {} binding groups",
            rule.data_source_names.len(),
            rule.table_rules.len(),
            rule.binding_groups.len()
        );
        Ok(rule)
    }

    pub fn data_source_names(&self) -> &[String] {
        &self.data_source_names
    }

    pub fn contains_data_source(&self, name: &str) -> bool {
        self.data_source_names.iter().any(|ds| ds == name)
    }

    pub fn default_data_source(&self) -> Option<&str> {
        self.default_data_source.as_deref()
    }

    /// Instance of a data source; a data source without one is its own instance.
    pub fn instance_of<'a>(&'a self, data_source: &'a str) -> &'a str {
        self.instances
            .get(data_source)
            .map(String::as_str)
            .unwrap_or(data_source)
    }

    pub fn find_table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.table_rules.get(&logic_table.to_lowercase())
    }

    pub fn table_rule(&self, logic_table: &str) -> Result<&TableRule> {
        self.find_table_rule(logic_table)
            .ok_or_else(|| Error::TableRuleNotFound {
                table: logic_table.to_string(),
            })
    }

    pub fn is_broadcast_table(&self, logic_table: &str) -> bool {
        self.broadcast_tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(logic_table))
    }

    pub fn is_all_broadcast_tables(&self, logic_tables: &[String]) -> bool {
        !logic_tables.is_empty() && logic_tables.iter().all(|t| self.is_broadcast_table(t))
    }

    /// Ruled tables that are not broadcast.
    pub fn is_sharding_table(&self, logic_table: &str) -> bool {
        self.find_table_rule(logic_table).is_some() && !self.is_broadcast_table(logic_table)
    }

    pub fn sharding_logic_table_names(&self, logic_tables: &[String]) -> Vec<String> {
        logic_tables
            .iter()
            .filter(|t| self.is_sharding_table(t))
            .cloned()
            .collect()
    }

    pub fn has_any_table_rule(&self, logic_tables: &[String]) -> bool {
        logic_tables.iter().any(|t| self.find_table_rule(t).is_some())
    }

    pub fn binding_group(&self, logic_table: &str) -> Option<&[String]> {
        self.binding_groups
            .iter()
            .find(|group| group.iter().any(|t| t.eq_ignore_ascii_case(logic_table)))
            .map(Vec::as_slice)
    }

    /// All tables belong to one binding group.
    pub fn is_all_binding_tables(&self, logic_tables: &[String]) -> bool {
        let Some(first) = logic_tables.first() else {
            return false;
        };
        match self.binding_group(first) {
            Some(group) => logic_tables
                .iter()
                .all(|t| group.iter().any(|g| g.eq_ignore_ascii_case(t))),
            None => false,
        }
    }

    /// Actual table of `bound_logic_table` sitting at the same position on `data_source`
    /// as `actual_table` does within `primary_logic_table`.
    pub fn binding_actual_table(
        &self,
        data_source: &str,
        primary_logic_table: &str,
        actual_table: &str,
        bound_logic_table: &str,
    ) -> Result<String> {
        let primary = self.table_rule(primary_logic_table)?;
        let bound = self.table_rule(bound_logic_table)?;
        let index = primary
            .find_actual_table_index(data_source, actual_table)
            .ok_or_else(|| Error::NoRouteTarget {
                table: primary_logic_table.to_string(),
            })?;
        bound
            .actual_table_names(data_source)
            .into_iter()
            .nth(index)
            .ok_or_else(|| Error::NoRouteTarget {
                table: bound_logic_table.to_string(),
            })
    }

    pub fn database_strategy<'a>(&'a self, rule: &'a TableRule) -> Option<&'a ShardingStrategy> {
        rule.database_strategy()
            .or(self.default_database_strategy.as_ref())
    }

    pub fn table_strategy<'a>(&'a self, rule: &'a TableRule) -> Option<&'a ShardingStrategy> {
        rule.table_strategy().or(self.default_table_strategy.as_ref())
    }

    /// Generated key for a table with a key-generate strategy, `None` otherwise.
    pub fn generate_key(&self, logic_table: &str) -> Result<Option<(String, i64)>> {
        match self.find_table_rule(logic_table).and_then(TableRule::key_generate) {
            Some(strategy) => Ok(Some((
                strategy.column.clone(),
                strategy.generator.generate_key()?,
            ))),
            None => Ok(None),
        }
    }

    /// Logic table owning an actual table name, used to map metadata rows back.
    pub fn find_logic_table_by_actual(&self, actual_table: &str) -> Option<&str> {
        let mut rules: Vec<&TableRule> = self.table_rules.values().collect();
        rules.sort_by(|a, b| a.logic_table().cmp(b.logic_table()));
        rules
            .into_iter()
            .find(|rule| rule.has_actual_table(actual_table))
            .map(TableRule::logic_table)
    }

    /// Actual data source names as seen by a non-ruled table.
    pub fn data_sources_for_unruled_table(&self) -> Vec<String> {
        match &self.default_data_source {
            Some(ds) => vec![ds.clone()],
            None => self.data_source_names.clone(),
        }
    }
}

fn build_strategy(config: Option<&ShardingStrategyConfig>) -> Result<Option<ShardingStrategy>> {
    let Some(config) = config else {
        return Ok(None);
    };
    let algorithm: Arc<dyn ShardingAlgorithm> = match &config.algorithm {
        AlgorithmConfig::Mod { sharding_count } => {
            Arc::new(ModShardingAlgorithm::new(*sharding_count)?)
        }
        AlgorithmConfig::HashMod { sharding_count } => {
            Arc::new(HashModShardingAlgorithm::new(*sharding_count)?)
        }
        AlgorithmConfig::BoundaryRange { boundaries } => {
            Arc::new(BoundaryRangeShardingAlgorithm::new(boundaries.clone())?)
        }
        AlgorithmConfig::Interval {
            datetime_lower,
            datetime_upper,
            datetime_pattern,
            sharding_suffix_pattern,
            datetime_interval_amount,
            datetime_interval_unit,
        } => Arc::new(IntervalShardingAlgorithm::new(
            datetime_lower,
            datetime_upper,
            datetime_pattern.as_str(),
            sharding_suffix_pattern.as_str(),
            *datetime_interval_amount,
            *datetime_interval_unit,
        )?),
    };
    Ok(Some(ShardingStrategy::new(config.column.clone(), algorithm)))
}
