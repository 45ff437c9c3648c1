use super::{RouteContext, RouteMapper, RouteStrategy, RouteUnit};
use crate::error::{Error, Result};
use crate::rule::ShardingRule;
use crate::statement::StatementShape;
use rand::Rng;

fn pick_random<T>(items: &[T]) -> Option<&T> {
    if items.is_empty() {
        return None;
    }
    items.get(rand::rng().random_range(0..items.len()))
}

/// Route to exactly one data source.
pub fn route(statement: &StatementShape, rule: &ShardingRule) -> Result<RouteContext> {
    let unit = match statement.tables.as_slice() {
        [] => {
            let data_source = pick_random(rule.data_source_names())
                .ok_or_else(|| Error::Config("No data source configured".to_string()))?;
            RouteUnit::new(data_source.clone(), Vec::new())
        }
        [table] => route_single_table(table, rule)?,
        tables => route_multiple_tables(tables, rule)?,
    };
    Ok(RouteContext::new(RouteStrategy::Unicast, vec![unit]))
}

fn route_single_table(table: &str, rule: &ShardingRule) -> Result<RouteUnit> {
    match rule.find_table_rule(table) {
        Some(table_rule) => {
            let node = pick_random(table_rule.data_nodes()).ok_or_else(|| Error::NoRouteTarget {
                table: table.to_string(),
            })?;
            Ok(RouteUnit::new(
                node.data_source.clone(),
                vec![RouteMapper::new(table, node.table.clone())],
            ))
        }
        None => {
            let data_source = match rule.default_data_source() {
                Some(ds) => ds.to_string(),
                None => pick_random(rule.data_source_names())
                    .cloned()
                    .ok_or_else(|| Error::Config("No data source configured".to_string()))?,
            };
            Ok(RouteUnit::new(data_source, vec![RouteMapper::identity(table)]))
        }
    }
}

fn route_multiple_tables(tables: &[String], rule: &ShardingRule) -> Result<RouteUnit> {
    let mut intersection: Option<Vec<String>> = None;
    for table in tables {
        let available = match rule.find_table_rule(table) {
            Some(table_rule) => table_rule.data_source_names().to_vec(),
            None => rule.data_sources_for_unruled_table(),
        };
        intersection = Some(match intersection {
            None => available,
            Some(current) => current.into_iter().filter(|ds| available.contains(ds)).collect(),
        });
    }
    let mut candidates = intersection.unwrap_or_default();
    candidates.sort();
    let data_source = pick_random(&candidates)
        .cloned()
        .ok_or_else(|| Error::UnicastIntersectionEmpty {
            tables: tables.to_vec(),
        })?;

    let mut mappers = Vec::with_capacity(tables.len());
    for table in tables {
        let actual = match rule.find_table_rule(table) {
            Some(table_rule) => table_rule
                .actual_table_names(&data_source)
                .into_iter()
                .next()
                .ok_or_else(|| Error::NoRouteTarget {
                    table: table.clone(),
                })?,
            None => table.clone(),
        };
        mappers.push(RouteMapper::new(table.clone(), actual));
    }
    Ok(RouteUnit::new(data_source, mappers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{DataNode, TableRule};

    fn rule() -> ShardingRule {
        ShardingRule::new(vec!["ds_0".to_string(), "ds_1".to_string()])
            .with_table_rule(TableRule::new(
                "t_order",
                DataNode::parse_inline("ds_${0..1}.t_order_${0..1}").unwrap(),
            ))
            .with_table_rule(TableRule::new(
                "t_archive",
                DataNode::parse_inline("ds_1.t_archive").unwrap(),
            ))
            .with_table_rule(TableRule::new(
                "t_audit",
                DataNode::parse_inline("ds_0.t_audit").unwrap(),
            ))
            .with_broadcast_table("t_config")
            .with_broadcast_table("t_dict")
    }

    #[test]
    fn test_zero_tables() {
        let context = route(&StatementShape::select("SELECT 1"), &rule()).unwrap();
        assert_eq!(context.units.len(), 1);
        assert!(context.units[0].table_mappers.is_empty());
        assert!(["ds_0", "ds_1"].contains(&context.units[0].data_source_name()));
    }

    #[test]
    fn test_all_broadcast_tables() {
        let statement = StatementShape::select("").with_tables(&["t_config", "t_dict"]);
        let context = route(&statement, &rule()).unwrap();
        assert_eq!(context.units.len(), 1);
        let unit = &context.units[0];
        assert_eq!(unit.table_mappers.len(), 2);
        assert_eq!(unit.actual_table("t_config"), Some("t_config"));
        assert_eq!(unit.actual_table("t_dict"), Some("t_dict"));
    }

    #[test]
    fn test_unruled_single_table_with_default() {
        let rule = rule().with_default_data_source(Some("ds_1".to_string()));
        let statement = StatementShape::select("").with_tables(&["t_user"]);
        let context = route(&statement, &rule).unwrap();
        assert_eq!(context.units[0].data_source_name(), "ds_1");
        assert_eq!(context.units[0].table_mappers, vec![RouteMapper::identity("t_user")]);
    }

    #[test]
    fn test_intersection() {
        let statement = StatementShape::select("").with_tables(&["t_archive", "t_order"]);
        for _ in 0..20 {
            let context = route(&statement, &rule()).unwrap();
            let unit = &context.units[0];
            assert_eq!(unit.data_source_name(), "ds_1");
            assert_eq!(unit.actual_table("t_order"), Some("t_order_0"));
            assert_eq!(unit.actual_table("t_archive"), Some("t_archive"));
        }
    }

    #[test]
    fn test_empty_intersection() {
        let statement = StatementShape::select("").with_tables(&["t_archive", "t_audit"]);
        let err = route(&statement, &rule()).unwrap_err();
        assert!(matches!(err, Error::UnicastIntersectionEmpty { .. }));
        assert!(err.is_configuration_error());
    }
}
