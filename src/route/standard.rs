use super::{RouteContext, RouteMapper, RouteStrategy, RouteUnit};
use crate::error::{Error, Result};
use crate::rule::{DataNode, ShardingRule, TableRule};
use crate::statement::{ShardingCondition, StatementShape};
use crate::value::Value;

/// Route a statement whose sharding tables are one table or one binding group.
pub fn route(statement: &StatementShape, rule: &ShardingRule, params: &[Value]) -> Result<RouteContext> {
    let sharding_tables = rule.sharding_logic_table_names(&statement.tables);
    let primary = sharding_tables
        .first()
        .ok_or_else(|| Error::Generic("Standard routing needs a sharding table".to_string()))?;

    let (nodes, original) = route_data_nodes(primary, &sharding_tables, &statement.conditions, rule, params)?;

    let mut units = Vec::with_capacity(nodes.len());
    for node in &nodes {
        let mut mappers = Vec::with_capacity(statement.tables.len());
        for table in &statement.tables {
            let actual = if table == primary {
                node.table.clone()
            } else if sharding_tables.contains(table) {
                rule.binding_actual_table(&node.data_source, primary, &node.table, table)?
            } else {
                companion_actual_table(table, &node.data_source, rule)?
            };
            mappers.push(RouteMapper::new(table.clone(), actual));
        }
        units.push(RouteUnit::new(node.data_source.clone(), mappers));
    }
    Ok(RouteContext::new(RouteStrategy::Standard, units).with_original_data_nodes(original))
}

/// Data nodes of `logic_table` selected by every OR branch, deduplicated in first-seen order,
/// plus the per-branch node lists.
pub(crate) fn route_data_nodes(
    logic_table: &str,
    binding_tables: &[String],
    conditions: &[ShardingCondition],
    rule: &ShardingRule,
    params: &[Value],
) -> Result<(Vec<DataNode>, Vec<Vec<DataNode>>)> {
    let table_rule = rule.table_rule(logic_table)?;
    let mut original = Vec::new();
    if conditions.is_empty() {
        original.push(route_by_condition(table_rule, binding_tables, None, rule, params)?);
    } else {
        for condition in conditions {
            original.push(route_by_condition(
                table_rule,
                binding_tables,
                Some(condition),
                rule,
                params,
            )?);
        }
    }

    let mut nodes: Vec<DataNode> = Vec::new();
    for node in original.iter().flatten() {
        if !nodes.contains(node) {
            nodes.push(node.clone());
        }
    }
    if nodes.is_empty() {
        return Err(Error::NoRouteTarget {
            table: logic_table.to_string(),
        });
    }
    Ok((nodes, original))
}

fn route_by_condition(
    table_rule: &TableRule,
    binding_tables: &[String],
    condition: Option<&ShardingCondition>,
    rule: &ShardingRule,
    params: &[Value],
) -> Result<Vec<DataNode>> {
    let data_sources = match rule.database_strategy(table_rule) {
        Some(strategy) => {
            let values = match condition {
                Some(c) => c.values_for(binding_tables, strategy.column(), params)?,
                None => Vec::new(),
            };
            strategy.do_sharding(table_rule.data_source_names(), &values)?
        }
        None => table_rule.data_source_names().to_vec(),
    };

    let mut nodes = Vec::new();
    for data_source in &data_sources {
        let candidates = table_rule.actual_table_names(data_source);
        let tables = match rule.table_strategy(table_rule) {
            Some(strategy) => {
                let values = match condition {
                    Some(c) => c.values_for(binding_tables, strategy.column(), params)?,
                    None => Vec::new(),
                };
                strategy.do_sharding(&candidates, &values)?
            }
            None => candidates,
        };
        nodes.extend(
            tables
                .into_iter()
                .map(|table| DataNode::new(data_source.clone(), table)),
        );
    }
    Ok(nodes)
}

/// Broadcast and unruled tables travel along with the sharding table.
pub(crate) fn companion_actual_table(table: &str, data_source: &str, rule: &ShardingRule) -> Result<String> {
    match rule.find_table_rule(table) {
        Some(table_rule) => table_rule
            .actual_table_names(data_source)
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoRouteTarget {
                table: table.to_string(),
            }),
        None => Ok(table.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{ModShardingAlgorithm, ShardingStrategy};
    use crate::statement::{Operand, ShardingConditionValue};
    use std::sync::Arc;

    fn strategy(column: &str) -> Option<ShardingStrategy> {
        Some(ShardingStrategy::new(
            column,
            Arc::new(ModShardingAlgorithm::new(2).unwrap()),
        ))
    }

    fn rule() -> ShardingRule {
        let sharded = |logic: &str| {
            TableRule::new(
                logic,
                DataNode::parse_inline(&format!("ds_${{0..1}}.{}_${{0..1}}", logic)).unwrap(),
            )
            .with_database_strategy(strategy("user_id"))
            .with_table_strategy(strategy("order_id"))
        };
        ShardingRule::new(vec!["ds_0".to_string(), "ds_1".to_string()])
            .with_table_rule(sharded("t_order"))
            .with_table_rule(sharded("t_order_item"))
            .with_binding_group(&["t_order", "t_order_item"])
            .with_broadcast_table("t_config")
    }

    fn equal(table: &str, column: &str, index: usize) -> ShardingConditionValue {
        ShardingConditionValue::equal(table, column, Operand::Parameter(index))
    }

    #[test]
    fn test_pinned_to_one_node() {
        let statement = StatementShape::select("")
            .with_tables(&["t_order"])
            .with_condition(ShardingCondition::new(vec![
                equal("t_order", "user_id", 0),
                equal("t_order", "order_id", 1),
            ]));
        let context = route(&statement, &rule(), &[Value::Int(3), Value::Int(4)]).unwrap();
        assert_eq!(context.units.len(), 1);
        assert_eq!(context.units[0].to_string(), "ds_1[t_order_0]");
        assert_eq!(context.original_data_node_count(), 1);
    }

    #[test]
    fn test_full_fan_out_without_conditions() {
        let statement = StatementShape::select("").with_tables(&["t_order"]);
        let context = route(&statement, &rule(), &[]).unwrap();
        assert_eq!(context.units.len(), 4);
        assert_eq!(context.units[0].to_string(), "ds_0[t_order_0]");
        assert_eq!(context.units[3].to_string(), "ds_1[t_order_1]");
    }

    #[test]
    fn test_binding_tables_follow_primary() {
        let statement = StatementShape::select("")
            .with_tables(&["t_order", "t_order_item", "t_config"])
            .with_condition(ShardingCondition::new(vec![
                equal("t_order_item", "user_id", 0),
                equal("t_order", "order_id", 1),
            ]));
        let context = route(&statement, &rule(), &[Value::Int(0), Value::Int(1)]).unwrap();
        assert_eq!(context.units.len(), 1);
        let unit = &context.units[0];
        assert_eq!(unit.data_source_name(), "ds_0");
        assert_eq!(unit.actual_table("t_order"), Some("t_order_1"));
        assert_eq!(unit.actual_table("t_order_item"), Some("t_order_item_1"));
        assert_eq!(unit.actual_table("t_config"), Some("t_config"));
    }

    #[test]
    fn test_or_branches_union() {
        let statement = StatementShape::select("")
            .with_tables(&["t_order"])
            .with_condition(ShardingCondition::new(vec![
                equal("t_order", "user_id", 0),
                equal("t_order", "order_id", 0),
            ]))
            .with_condition(ShardingCondition::new(vec![
                equal("t_order", "user_id", 1),
                equal("t_order", "order_id", 1),
            ]))
            .with_condition(ShardingCondition::new(vec![
                equal("t_order", "user_id", 0),
                equal("t_order", "order_id", 0),
            ]));
        let context = route(&statement, &rule(), &[Value::Int(2), Value::Int(3)]).unwrap();
        let units: Vec<String> = context.units.iter().map(ToString::to_string).collect();
        assert_eq!(units, vec!["ds_0[t_order_0]", "ds_1[t_order_1]"]);
        assert_eq!(context.original_data_nodes.len(), 3);
    }

    #[test]
    fn test_missing_parameter() {
        let statement = StatementShape::select("")
            .with_tables(&["t_order"])
            .with_condition(ShardingCondition::new(vec![equal("t_order", "user_id", 2)]));
        let err = route(&statement, &rule(), &[Value::Int(1)]).unwrap_err();
        assert_eq!(err, Error::ParameterIndexOutOfRange { index: 2, count: 1 });
    }
}
