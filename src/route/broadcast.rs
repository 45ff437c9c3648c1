use super::{RouteContext, RouteMapper, RouteStrategy, RouteUnit};
use crate::error::{Error, Result};
use crate::rule::ShardingRule;
use crate::statement::StatementShape;

/// One unit per data source, tables mapped to themselves.
pub fn route_database(statement: &StatementShape, rule: &ShardingRule) -> Result<RouteContext> {
    let units = rule
        .data_source_names()
        .iter()
        .map(|ds| {
            RouteUnit::new(
                ds.clone(),
                statement.tables.iter().map(RouteMapper::identity).collect(),
            )
        })
        .collect::<Vec<_>>();
    non_empty(RouteStrategy::DatabaseBroadcast, units)
}

/// One unit per data node of every referenced ruled table.
pub fn route_table(statement: &StatementShape, rule: &ShardingRule) -> Result<RouteContext> {
    let mut units = Vec::new();
    for table in &statement.tables {
        if let Some(table_rule) = rule.find_table_rule(table) {
            for node in table_rule.data_nodes() {
                units.push(RouteUnit::new(
                    node.data_source.clone(),
                    vec![RouteMapper::new(table.clone(), node.table.clone())],
                ));
            }
        }
    }
    non_empty(RouteStrategy::TableBroadcast, units)
}

/// One unit per database instance, using its first data source.
pub fn route_instance(statement: &StatementShape, rule: &ShardingRule) -> Result<RouteContext> {
    let mut seen: Vec<&str> = Vec::new();
    let mut units = Vec::new();
    for ds in rule.data_source_names() {
        let instance = rule.instance_of(ds);
        if seen.contains(&instance) {
            continue;
        }
        seen.push(instance);
        units.push(RouteUnit::new(
            ds.clone(),
            statement.tables.iter().map(RouteMapper::identity).collect(),
        ));
    }
    non_empty(RouteStrategy::InstanceBroadcast, units)
}

fn non_empty(strategy: RouteStrategy, units: Vec<RouteUnit>) -> Result<RouteContext> {
    if units.is_empty() {
        return Err(Error::Config(format!(
            "{} routing found no target",
            strategy.name()
        )));
    }
    Ok(RouteContext::new(strategy, units))
}
