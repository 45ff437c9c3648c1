use super::hint::HintContext;
use super::strategy::{select_strategy, RouteStrategy};
use super::{broadcast, complex, hint, standard, unicast, RouteContext};
use crate::config::ShardingProps;
use crate::error::{Error, Result};
use crate::metrics::METRICS;
use crate::rule::ShardingRule;
use crate::statement::StatementShape;
use crate::value::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Full routing path: strategy selection followed by the chosen strategy.
#[derive(Debug, Clone)]
pub struct ShardingRouter {
    rule: Arc<ShardingRule>,
    props: ShardingProps,
}

impl ShardingRouter {
    pub fn new(rule: Arc<ShardingRule>, props: ShardingProps) -> Self {
        Self { rule, props }
    }

    pub fn rule(&self) -> &Arc<ShardingRule> {
        &self.rule
    }

    pub fn props(&self) -> &ShardingProps {
        &self.props
    }

    pub fn route(
        &self,
        statement: &StatementShape,
        params: &[Value],
        hint: Option<&HintContext>,
    ) -> Result<RouteContext> {
        for condition in &statement.conditions {
            condition.check_parameters(params)?;
        }

        let strategy = select_strategy(statement, &self.rule, hint);
        debug!("Selected {} routing for tables {:?}", strategy.name(), statement.tables);

        let guard = METRICS.read().record_route(strategy.name());
        let result = self.execute(strategy, statement, params, hint);
        guard.complete(result.is_ok());

        let context = result?;
        self.show_route(statement, &context);
        Ok(context)
    }

    /// Account for a route served from the route cache as if it was computed.
    pub(crate) fn observe_cached(&self, statement: &StatementShape, context: &RouteContext) {
        METRICS.read().record_route(context.strategy.name()).complete(true);
        self.show_route(statement, context);
    }

    fn show_route(&self, statement: &StatementShape, context: &RouteContext) {
        if self.props.sql_show {
            info!("Logic SQL: {}", statement.sql);
            for unit in &context.units {
                info!("Actual route: {}", unit);
            }
        }
    }

    fn execute(
        &self,
        strategy: RouteStrategy,
        statement: &StatementShape,
        params: &[Value],
        hint_context: Option<&HintContext>,
    ) -> Result<RouteContext> {
        let rule = self.rule.as_ref();
        match strategy {
            RouteStrategy::Unicast => unicast::route(statement, rule),
            RouteStrategy::Standard => standard::route(statement, rule, params),
            RouteStrategy::Complex => complex::route(statement, rule, params),
            RouteStrategy::Hint => {
                let hint_context = hint_context
                    .ok_or_else(|| Error::Generic("Hint routing without hint context".to_string()))?;
                hint::route(statement, rule, hint_context)
            }
            RouteStrategy::DatabaseBroadcast => broadcast::route_database(statement, rule),
            RouteStrategy::TableBroadcast => broadcast::route_table(statement, rule),
            RouteStrategy::InstanceBroadcast => broadcast::route_instance(statement, rule),
        }
    }
}
