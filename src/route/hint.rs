use super::{cartesian_product, RouteContext, RouteMapper, RouteStrategy, RouteUnit};
use crate::error::{Error, Result};
use crate::rule::ShardingRule;
use crate::statement::StatementShape;
use std::collections::HashMap;

/// Caller-supplied routing override, passed explicitly with each statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HintContext {
    pub data_sources: Vec<String>,
    /// Logic table -> actual tables to use on every hinted data source.
    pub tables: HashMap<String, Vec<String>>,
}

impl HintContext {
    pub fn new(data_sources: Vec<String>) -> Self {
        Self {
            data_sources,
            tables: HashMap::new(),
        }
    }

    pub fn with_tables(mut self, logic_table: &str, actual_tables: &[&str]) -> Self {
        self.tables.insert(
            logic_table.to_lowercase(),
            actual_tables.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    fn tables_for(&self, logic_table: &str) -> Option<&Vec<String>> {
        self.tables.get(&logic_table.to_lowercase())
    }
}

/// Route to hinted data sources, bypassing the sharding algorithms.
pub fn route(statement: &StatementShape, rule: &ShardingRule, hint: &HintContext) -> Result<RouteContext> {
    let mut units = Vec::new();
    for data_source in &hint.data_sources {
        if !rule.contains_data_source(data_source) {
            return Err(Error::HintDataSourceNotFound {
                name: data_source.clone(),
            });
        }

        let mut choices: Vec<Vec<RouteMapper>> = Vec::with_capacity(statement.tables.len());
        for table in &statement.tables {
            let actual_tables = match (rule.find_table_rule(table), hint.tables_for(table)) {
                (Some(table_rule), Some(hinted)) => {
                    for actual in hinted {
                        if !table_rule.contains_data_node(data_source, actual) {
                            return Err(Error::HintTableNotFound {
                                data_source: data_source.clone(),
                                table: actual.clone(),
                            });
                        }
                    }
                    hinted.clone()
                }
                (Some(table_rule), None) => table_rule.actual_table_names(data_source),
                (None, Some(hinted)) => hinted.clone(),
                (None, None) => vec![table.clone()],
            };
            if actual_tables.is_empty() {
                return Err(Error::HintTableNotFound {
                    data_source: data_source.clone(),
                    table: table.clone(),
                });
            }
            choices.push(
                actual_tables
                    .into_iter()
                    .map(|actual| RouteMapper::new(table.clone(), actual))
                    .collect(),
            );
        }

        for mappers in cartesian_product(&choices) {
            units.push(RouteUnit::new(data_source.clone(), mappers));
        }
    }
    Ok(RouteContext::new(RouteStrategy::Hint, units))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{DataNode, TableRule};

    fn rule() -> ShardingRule {
        ShardingRule::new(vec!["ds_0".to_string(), "ds_1".to_string()]).with_table_rule(
            TableRule::new(
                "t_order",
                DataNode::parse_inline("ds_${0..1}.t_order_${0..1}").unwrap(),
            ),
        )
    }

    #[test]
    fn test_hinted_tables() {
        let hint = HintContext::new(vec!["ds_1".to_string()]).with_tables("T_ORDER", &["t_order_1"]);
        let statement = StatementShape::select("").with_tables(&["t_order", "t_user"]);
        let context = route(&statement, &rule(), &hint).unwrap();
        assert_eq!(context.units.len(), 1);
        assert_eq!(context.units[0].to_string(), "ds_1[t_order_1, t_user]");
    }

    #[test]
    fn test_all_tables_of_hinted_data_source() {
        let hint = HintContext::new(vec!["ds_0".to_string(), "ds_1".to_string()]);
        let statement = StatementShape::select("").with_tables(&["t_order"]);
        let context = route(&statement, &rule(), &hint).unwrap();
        assert_eq!(context.units.len(), 4);
    }

    #[test]
    fn test_unknown_hint_targets() {
        let statement = StatementShape::select("").with_tables(&["t_order"]);
        let err = route(&statement, &rule(), &HintContext::new(vec!["ds_9".to_string()])).unwrap_err();
        assert_eq!(err, Error::HintDataSourceNotFound { name: "ds_9".to_string() });

        let hint = HintContext::new(vec!["ds_0".to_string()]).with_tables("t_order", &["t_order_7"]);
        let err = route(&statement, &rule(), &hint).unwrap_err();
        assert!(matches!(err, Error::HintTableNotFound { .. }));
    }
}
