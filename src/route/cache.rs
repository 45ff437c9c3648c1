use super::engine::ShardingRouter;
use super::hint::HintContext;
use super::RouteContext;
use crate::config::RouteCacheConfig;
use crate::error::Result;
use crate::metrics::METRICS;
use crate::rule::ShardingRule;
use crate::statement::{ConditionValue, Operand, StatementKind, StatementShape};
use crate::value::Value;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// SQL text plus the sharding parameter values it was bound with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteCacheKey {
    pub sql: String,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheableCheckResult {
    /// No evidence against caching; not a proof of a single shard.
    pub probably_cacheable: bool,
    /// Ordinal positions of parameters feeding sharding predicates.
    pub sharding_parameter_indexes: Vec<usize>,
}

impl CacheableCheckResult {
    pub fn not_cacheable() -> Self {
        Self::default()
    }
}

/// Decides whether a statement shape may use the route cache.
pub trait CacheableChecker: Send + Sync {
    fn check(&self, statement: &StatementShape, rule: &ShardingRule) -> CacheableCheckResult;
}

/// Accepts point queries on one sharding table (or binding group) whose only
/// sharding predicates are `column = ?`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShardingRouteCacheableChecker;

impl CacheableChecker for ShardingRouteCacheableChecker {
    fn check(&self, statement: &StatementShape, rule: &ShardingRule) -> CacheableCheckResult {
        let kind_ok = match statement.kind {
            StatementKind::Select | StatementKind::Update | StatementKind::Delete => true,
            StatementKind::Insert => statement.insert_rows == 1,
            _ => false,
        };
        if !kind_ok {
            return CacheableCheckResult::not_cacheable();
        }

        let sharding_tables = rule.sharding_logic_table_names(&statement.tables);
        if sharding_tables.is_empty()
            || sharding_tables.len() != statement.tables.len()
            || (sharding_tables.len() > 1 && !rule.is_all_binding_tables(&sharding_tables))
        {
            return CacheableCheckResult::not_cacheable();
        }

        let [condition] = statement.conditions.as_slice() else {
            return CacheableCheckResult::not_cacheable();
        };
        if condition.values.is_empty() {
            return CacheableCheckResult::not_cacheable();
        }
        let all_parameter_equalities = condition.values.iter().all(|v| {
            matches!(&v.value, ConditionValue::List(operands)
                if matches!(operands.as_slice(), [Operand::Parameter(_)]))
        });
        if !all_parameter_equalities {
            return CacheableCheckResult::not_cacheable();
        }

        CacheableCheckResult {
            probably_cacheable: true,
            sharding_parameter_indexes: statement.sharding_parameter_indexes(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub skips: u64,
    pub inserts: u64,
    pub size: usize,
}

impl RouteCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Concurrent cache of single-shard, single-table route results.
pub struct RouteCache {
    cache: DashMap<RouteCacheKey, RouteContext>,
    config: RouteCacheConfig,
    // Slots taken by distinct keys; bounds the map at maximum_size
    entries: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    skips: AtomicU64,
    inserts: AtomicU64,
}

impl RouteCache {
    pub fn new(config: RouteCacheConfig) -> Self {
        Self {
            cache: DashMap::with_capacity(config.initial_capacity),
            config,
            entries: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            skips: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RouteCacheConfig {
        &self.config
    }

    pub fn get(&self, key: &RouteCacheKey) -> Option<RouteContext> {
        self.cache.get(key).map(|entry| entry.value().clone())
    }

    /// Store a route. Only single-shard, single-table results are kept, and a full
    /// cache skips new keys instead of evicting.
    pub fn put(&self, key: RouteCacheKey, context: &RouteContext) -> bool {
        if !context.is_single_shard_single_table() {
            return false;
        }
        if let Some(mut existing) = self.cache.get_mut(&key) {
            *existing = context.clone();
            self.record_insert();
            return true;
        }
        let maximum_size = self.config.maximum_size;
        let reserved = self
            .entries
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < maximum_size).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            debug!("Route cache full at {} entries, not caching", maximum_size);
            return false;
        }
        if self.cache.insert(key, context.clone()).is_some() {
            // Another thread stored the same key first and holds its own slot
            self.entries.fetch_sub(1, Ordering::AcqRel);
        }
        self.record_insert();
        true
    }

    fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
        METRICS.read().record_cache_outcome("insert");
    }

    /// Serve a cacheable statement from the cache, or route it with `compute`
    /// and remember the result. `on_hit` sees every route served from the cache.
    pub fn load_or_compute<F, H>(
        &self,
        statement: &StatementShape,
        params: &[Value],
        rule: &ShardingRule,
        checker: &dyn CacheableChecker,
        compute: F,
        on_hit: H,
    ) -> Result<RouteContext>
    where
        F: FnOnce() -> Result<RouteContext>,
        H: FnOnce(&RouteContext),
    {
        if statement.sql.len() > self.config.max_sql_length {
            return self.skip(compute, "sql too long");
        }
        let check = checker.check(statement, rule);
        if !check.probably_cacheable {
            return self.skip(compute, "not cacheable");
        }
        let mut values = Vec::with_capacity(check.sharding_parameter_indexes.len());
        for index in &check.sharding_parameter_indexes {
            match params.get(*index) {
                Some(value) => values.push(value.clone()),
                None => return self.skip(compute, "parameter count mismatch"),
            }
        }

        let key = RouteCacheKey {
            sql: statement.sql.clone(),
            values,
        };
        if let Some(context) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            METRICS.read().record_cache_outcome("hit");
            debug!("Route cache hit for {}", key.sql);
            on_hit(&context);
            return Ok(context);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        METRICS.read().record_cache_outcome("miss");
        let context = compute()?;
        if self.put(key, &context) {
            debug!("Cached route {}", context);
        }
        Ok(context)
    }

    fn skip<F>(&self, compute: F, reason: &str) -> Result<RouteContext>
    where
        F: FnOnce() -> Result<RouteContext>,
    {
        self.skips.fetch_add(1, Ordering::Relaxed);
        METRICS.read().record_cache_outcome("skip");
        debug!("Route cache bypassed: {}", reason);
        compute()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drop every cached route, e.g. after a rule change.
    pub fn clear(&self) {
        let mut removed = 0;
        self.cache.retain(|_, _| {
            removed += 1;
            false
        });
        self.entries.fetch_sub(removed, Ordering::AcqRel);
    }

    pub fn stats(&self) -> RouteCacheStats {
        RouteCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            skips: self.skips.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            size: self.cache.len(),
        }
    }

    pub fn publish_metrics(&self) {
        let stats = self.stats();
        METRICS
            .read()
            .update_route_cache_metrics(stats.hits, stats.misses, stats.size);
    }
}

/// [`ShardingRouter`] with the route cache in front of it.
pub struct CachedShardingRouter {
    router: ShardingRouter,
    cache: RouteCache,
    checker: Arc<dyn CacheableChecker>,
}

impl CachedShardingRouter {
    pub fn new(router: ShardingRouter) -> Self {
        Self::with_checker(router, Arc::new(ShardingRouteCacheableChecker))
    }

    pub fn with_checker(router: ShardingRouter, checker: Arc<dyn CacheableChecker>) -> Self {
        let cache = RouteCache::new(router.props().route_cache.clone());
        Self {
            router,
            cache,
            checker,
        }
    }

    pub fn router(&self) -> &ShardingRouter {
        &self.router
    }

    pub fn cache(&self) -> &RouteCache {
        &self.cache
    }

    pub fn route(
        &self,
        statement: &StatementShape,
        params: &[Value],
        hint: Option<&HintContext>,
    ) -> Result<RouteContext> {
        if hint.is_some() || !self.cache.config().enabled {
            return self.router.route(statement, params, hint);
        }
        self.cache.load_or_compute(
            statement,
            params,
            self.router.rule(),
            self.checker.as_ref(),
            || self.router.route(statement, params, None),
            |context| self.router.observe_cached(statement, context),
        )
    }
}
