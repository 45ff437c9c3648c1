//! Routing engine
//!
//! Chooses one [`RouteStrategy`] per statement and turns it into a
//! [`RouteContext`]: the physical units an executor must run.

pub mod broadcast;
pub mod cache;
pub mod complex;
pub mod engine;
pub mod hint;
pub mod standard;
pub mod strategy;
pub mod unicast;

pub use cache::{
    CacheableCheckResult, CacheableChecker, CachedShardingRouter, RouteCache, RouteCacheKey,
    RouteCacheStats, ShardingRouteCacheableChecker,
};
pub use engine::ShardingRouter;
pub use hint::HintContext;
pub use strategy::{select_strategy, RouteStrategy};

use crate::rule::DataNode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logic name paired with the actual name it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteMapper {
    pub logic_name: String,
    pub actual_name: String,
}

impl RouteMapper {
    pub fn new(logic_name: impl Into<String>, actual_name: impl Into<String>) -> Self {
        Self {
            logic_name: logic_name.into(),
            actual_name: actual_name.into(),
        }
    }

    /// A name mapped to itself.
    pub fn identity(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), name)
    }
}

/// One execution target: a data source and the tables rewritten on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteUnit {
    pub data_source: RouteMapper,
    pub table_mappers: Vec<RouteMapper>,
}

impl RouteUnit {
    pub fn new(data_source: impl Into<String>, table_mappers: Vec<RouteMapper>) -> Self {
        Self {
            data_source: RouteMapper::identity(data_source),
            table_mappers,
        }
    }

    pub fn data_source_name(&self) -> &str {
        &self.data_source.actual_name
    }

    pub fn logic_table_names(&self) -> impl Iterator<Item = &str> {
        self.table_mappers.iter().map(|m| m.logic_name.as_str())
    }

    pub fn actual_table(&self, logic_table: &str) -> Option<&str> {
        self.table_mappers
            .iter()
            .find(|m| m.logic_name.eq_ignore_ascii_case(logic_table))
            .map(|m| m.actual_name.as_str())
    }
}

impl fmt::Display for RouteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data_source.actual_name)?;
        if !self.table_mappers.is_empty() {
            let tables: Vec<&str> = self
                .table_mappers
                .iter()
                .map(|m| m.actual_name.as_str())
                .collect();
            write!(f, "[{}]", tables.join(", "))?;
        }
        Ok(())
    }
}

/// Result of routing one statement. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteContext {
    pub units: Vec<RouteUnit>,
    /// Data nodes computed per sharding condition by standard routing.
    pub original_data_nodes: Vec<Vec<DataNode>>,
    pub strategy: RouteStrategy,
}

impl RouteContext {
    pub fn new(strategy: RouteStrategy, units: Vec<RouteUnit>) -> Self {
        Self {
            units,
            original_data_nodes: Vec::new(),
            strategy,
        }
    }

    pub fn with_original_data_nodes(mut self, nodes: Vec<Vec<DataNode>>) -> Self {
        self.original_data_nodes = nodes;
        self
    }

    pub fn is_single_unit(&self) -> bool {
        self.units.len() == 1
    }

    pub fn original_data_node_count(&self) -> usize {
        self.original_data_nodes.iter().map(Vec::len).sum()
    }

    pub fn data_source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for unit in &self.units {
            if !names.contains(&unit.data_source_name()) {
                names.push(unit.data_source_name());
            }
        }
        names
    }

    /// Single unit, single table and a single original data node.
    pub fn is_single_shard_single_table(&self) -> bool {
        self.units.len() == 1
            && self.units[0].table_mappers.len() == 1
            && self.original_data_node_count() == 1
    }
}

impl fmt::Display for RouteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units: Vec<String> = self.units.iter().map(ToString::to_string).collect();
        write!(f, "{:?} -> {}", self.strategy, units.join(", "))
    }
}

/// Cartesian product of per-table choices; the first table varies slowest.
pub(crate) fn cartesian_product<T: Clone>(choices: &[Vec<T>]) -> Vec<Vec<T>> {
    let mut result: Vec<Vec<T>> = vec![Vec::new()];
    for options in choices {
        let mut next = Vec::with_capacity(result.len() * options.len());
        for prefix in &result {
            for option in options {
                let mut combination = prefix.clone();
                combination.push(option.clone());
                next.push(combination);
            }
        }
        result = next;
    }
    result
}
