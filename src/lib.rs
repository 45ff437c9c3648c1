pub mod config;
pub mod error;
pub mod logging;
pub mod merge;
pub mod metrics;
pub mod route;
pub mod rule;
pub mod statement;
pub mod value;

pub use config::{RouteCacheConfig, ShardingProps, ShardingRuleConfig};
pub use error::{Error, ErrorContext, Result};
pub use merge::{EncryptRule, MergeEngine, MergedResult, QueryResult};
pub use route::{
    CachedShardingRouter, HintContext, RouteContext, RouteMapper, RouteStrategy, RouteUnit,
    ShardingRouter,
};
pub use rule::{DataNode, ShardingRule, TableRule};
pub use statement::StatementShape;
pub use value::Value;

use crate::metrics::METRICS;
use std::sync::Arc;
use tracing::info;

/// Routing and merging for one sharding rule: route a statement, hand the units
/// to an executor, then merge the shard results it returns.
pub struct ShardingRuntime {
    router: CachedShardingRouter,
    merger: MergeEngine,
}

impl ShardingRuntime {
    pub fn new(rule: ShardingRule, props: ShardingProps) -> Self {
        let rule = Arc::new(rule);
        Self {
            router: CachedShardingRouter::new(ShardingRouter::new(rule.clone(), props)),
            merger: MergeEngine::new(rule),
        }
    }

    pub fn from_config(config: &ShardingRuleConfig, props: ShardingProps) -> Result<Self> {
        let rule = ShardingRule::from_config(config)?;
        info!(
            "Sharding runtime ready with {} data sources",
            rule.data_source_names().len()
        );
        Ok(Self::new(rule, props))
    }

    pub fn with_encrypt_rule(mut self, encrypt_rule: EncryptRule) -> Self {
        self.merger = self.merger.with_encrypt_rule(Arc::new(encrypt_rule));
        self
    }

    pub fn rule(&self) -> &Arc<ShardingRule> {
        self.router.router().rule()
    }

    pub fn router(&self) -> &CachedShardingRouter {
        &self.router
    }

    pub fn route(
        &self,
        statement: &StatementShape,
        params: &[Value],
        hint: Option<&HintContext>,
    ) -> Result<RouteContext> {
        self.router.route(statement, params, hint)
    }

    pub fn merge(
        &self,
        results: Vec<Box<dyn QueryResult>>,
        statement: &StatementShape,
    ) -> Result<Box<dyn MergedResult>> {
        self.merger.merge(results, statement)
    }

    /// Prometheus text exposition, with the route cache gauges refreshed first.
    pub fn export_metrics(&self) -> Result<String> {
        self.router.cache().publish_metrics();
        METRICS.read().export()
    }

    /// Flush cached routes after the rule behind them changed.
    pub fn clear_route_cache(&self) {
        self.router.cache().clear();
    }
}
