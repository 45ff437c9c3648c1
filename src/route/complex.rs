use super::standard::{companion_actual_table, route_data_nodes};
use super::{cartesian_product, RouteContext, RouteMapper, RouteStrategy, RouteUnit};
use crate::error::{Error, Result};
use crate::rule::ShardingRule;
use crate::statement::StatementShape;
use crate::value::Value;

/// Tables routed together: a binding group present in the statement, or one table.
struct RoutedGroup {
    tables: Vec<String>,
    /// (data source, one mapper per table of the group)
    targets: Vec<(String, Vec<RouteMapper>)>,
}

impl RoutedGroup {
    fn options_on(&self, data_source: &str) -> Vec<Vec<RouteMapper>> {
        let mut options: Vec<Vec<RouteMapper>> = Vec::new();
        for (ds, mappers) in &self.targets {
            if ds == data_source && !options.contains(mappers) {
                options.push(mappers.clone());
            }
        }
        options
    }

    fn has_data_source(&self, data_source: &str) -> bool {
        self.targets.iter().any(|(ds, _)| ds == data_source)
    }
}

/// Route a join across several independently sharded tables.
pub fn route(statement: &StatementShape, rule: &ShardingRule, params: &[Value]) -> Result<RouteContext> {
    let sharding_tables = rule.sharding_logic_table_names(&statement.tables);
    let mut groups: Vec<RoutedGroup> = Vec::new();
    let mut original = Vec::new();

    for table in &sharding_tables {
        if groups.iter().any(|g| g.tables.contains(table)) {
            continue;
        }
        let members: Vec<String> = match rule.binding_group(table) {
            Some(group) => sharding_tables
                .iter()
                .filter(|t| group.iter().any(|g| g.eq_ignore_ascii_case(t)))
                .cloned()
                .collect(),
            None => vec![table.clone()],
        };
        let (nodes, per_condition) =
            route_data_nodes(table, &members, &statement.conditions, rule, params)?;
        original.extend(per_condition);

        let mut targets = Vec::with_capacity(nodes.len());
        for node in nodes {
            let mut mappers = Vec::with_capacity(members.len());
            for member in &members {
                let actual = if member == table {
                    node.table.clone()
                } else {
                    rule.binding_actual_table(&node.data_source, table, &node.table, member)?
                };
                mappers.push(RouteMapper::new(member.clone(), actual));
            }
            targets.push((node.data_source, mappers));
        }
        groups.push(RoutedGroup {
            tables: members,
            targets,
        });
    }

    let mut data_sources: Vec<String> = Vec::new();
    if let Some(first) = groups.first() {
        for (ds, _) in &first.targets {
            if !data_sources.contains(ds) && groups.iter().all(|g| g.has_data_source(ds)) {
                data_sources.push(ds.clone());
            }
        }
    }
    if data_sources.is_empty() {
        return Err(Error::NoDataSourceIntersection {
            tables: sharding_tables,
        });
    }

    let mut units = Vec::new();
    for data_source in &data_sources {
        let mut choices: Vec<Vec<Vec<RouteMapper>>> = groups.iter().map(|g| g.options_on(data_source)).collect();
        for table in &statement.tables {
            if !sharding_tables.contains(table) {
                let actual = companion_actual_table(table, data_source, rule)?;
                choices.push(vec![vec![RouteMapper::new(table.clone(), actual)]]);
            }
        }
        for combination in cartesian_product(&choices) {
            let mut mappers: Vec<RouteMapper> = combination.into_iter().flatten().collect();
            mappers.sort_by_key(|m| {
                statement
                    .tables
                    .iter()
                    .position(|t| *t == m.logic_name)
                    .unwrap_or(usize::MAX)
            });
            units.push(RouteUnit::new(data_source.clone(), mappers));
        }
    }
    Ok(RouteContext::new(RouteStrategy::Complex, units).with_original_data_nodes(original))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{DataNode, ModShardingAlgorithm, ShardingStrategy, TableRule};
    use crate::statement::{Operand, ShardingCondition, ShardingConditionValue};
    use std::sync::Arc;

    fn mod2(column: &str) -> Option<ShardingStrategy> {
        Some(ShardingStrategy::new(
            column,
            Arc::new(ModShardingAlgorithm::new(2).unwrap()),
        ))
    }

    fn rule() -> ShardingRule {
        ShardingRule::new(vec!["ds_0".to_string(), "ds_1".to_string(), "ds_2".to_string()])
            .with_table_rule(
                TableRule::new(
                    "t_order",
                    DataNode::parse_inline("ds_${0..1}.t_order_${0..1}").unwrap(),
                )
                .with_database_strategy(mod2("user_id"))
                .with_table_strategy(mod2("order_id")),
            )
            .with_table_rule(
                TableRule::new(
                    "t_user",
                    DataNode::parse_inline("ds_${0..1}.t_user_${0..1}").unwrap(),
                )
                .with_database_strategy(mod2("user_id"))
                .with_table_strategy(mod2("user_id")),
            )
            .with_table_rule(TableRule::new(
                "t_audit",
                DataNode::parse_inline("ds_2.t_audit_${0..1}").unwrap(),
            ))
            .with_broadcast_table("t_config")
    }

    #[test]
    fn test_join_on_common_data_source() {
        let statement = StatementShape::select("")
            .with_tables(&["t_order", "t_user", "t_config"])
            .with_condition(ShardingCondition::new(vec![
                ShardingConditionValue::equal("t_order", "user_id", Operand::Parameter(0)),
                ShardingConditionValue::equal("t_user", "user_id", Operand::Parameter(0)),
            ]));
        let context = route(&statement, &rule(), &[Value::Int(1)]).unwrap();
        assert_eq!(context.strategy, RouteStrategy::Complex);
        // t_order has two tables on ds_1, t_user pinned to t_user_1
        let units: Vec<String> = context.units.iter().map(ToString::to_string).collect();
        assert_eq!(
            units,
            vec![
                "ds_1[t_order_0, t_user_1, t_config]",
                "ds_1[t_order_1, t_user_1, t_config]"
            ]
        );
    }

    #[test]
    fn test_disjoint_data_sources() {
        let statement = StatementShape::select("").with_tables(&["t_order", "t_audit"]);
        let err = route(&statement, &rule(), &[]).unwrap_err();
        assert!(matches!(err, Error::NoDataSourceIntersection { .. }));
    }
}
