use crate::error::{Error, Result};
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramOpts, HistogramVec, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

lazy_static::lazy_static! {
    // Route decisions by strategy
    static ref ROUTE_COUNTER: CounterVec = register_counter_vec!(
        "shardgate_routes_total",
        "Total number of routed statements",
        &["strategy", "status"]
    ).unwrap();

    static ref ROUTE_LATENCY: HistogramVec = register_histogram_vec!(
        HistogramOpts::new(
            "shardgate_route_duration_seconds",
            "Routing latency in seconds"
        ).buckets(vec![0.000001, 0.00001, 0.0001, 0.001, 0.01, 0.1]),
        &["strategy"]
    ).unwrap();

    // Route cache lookups: hit, miss, skip, insert
    static ref ROUTE_CACHE_COUNTER: CounterVec = register_counter_vec!(
        "shardgate_route_cache_total",
        "Route cache lookups by outcome",
        &["outcome"]
    ).unwrap();

    static ref ROUTE_CACHE_METRICS: GaugeVec = register_gauge_vec!(
        "shardgate_route_cache_metrics",
        "Route cache statistics",
        &["metric"]
    ).unwrap();

    // Merged results by variant
    static ref MERGE_COUNTER: CounterVec = register_counter_vec!(
        "shardgate_merges_total",
        "Total number of merged results",
        &["variant"]
    ).unwrap();
}

pub struct MetricsRecorder {
    enabled: bool,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    // Start timing a route; the guard records completion
    pub fn record_route(&self, strategy: &str) -> RouteGuard {
        RouteGuard::new(strategy, self.enabled)
    }

    /// Routes counted so far for one strategy and outcome.
    pub fn route_count(&self, strategy: &str, success: bool) -> u64 {
        let status = if success { "success" } else { "failure" };
        ROUTE_COUNTER.with_label_values(&[strategy, status]).get() as u64
    }

    pub fn record_cache_outcome(&self, outcome: &str) {
        if self.enabled {
            ROUTE_CACHE_COUNTER.with_label_values(&[outcome]).inc();
        }
    }

    pub fn update_route_cache_metrics(&self, hits: u64, misses: u64, size: usize) {
        if self.enabled {
            ROUTE_CACHE_METRICS
                .with_label_values(&["hits"])
                .set(hits as f64);
            ROUTE_CACHE_METRICS
                .with_label_values(&["misses"])
                .set(misses as f64);
            ROUTE_CACHE_METRICS
                .with_label_values(&["size"])
                .set(size as f64);

            let hit_rate = if hits + misses > 0 {
                hits as f64 / (hits + misses) as f64
            } else {
                0.0
            };
            ROUTE_CACHE_METRICS
                .with_label_values(&["hit_rate"])
                .set(hit_rate);
        }
    }

    pub fn record_merge(&self, variant: &str) {
        if self.enabled {
            MERGE_COUNTER.with_label_values(&[variant]).inc();
        }
    }

    // Export metrics in Prometheus format
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();

        encoder.encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer)
            .map_err(|e| Error::Generic(format!("Failed to convert metrics to string: {}", e)))
    }
}

pub struct RouteGuard {
    strategy: String,
    start: Instant,
    enabled: bool,
    completed: bool,
}

impl RouteGuard {
    fn new(strategy: &str, enabled: bool) -> Self {
        Self {
            strategy: strategy.to_string(),
            start: Instant::now(),
            enabled,
            completed: false,
        }
    }

    pub fn complete(mut self, success: bool) {
        self.completed = true;
        self.observe(success);
    }

    fn observe(&self, success: bool) {
        if self.enabled {
            ROUTE_LATENCY
                .with_label_values(&[&self.strategy])
                .observe(self.start.elapsed().as_secs_f64());
            let status = if success { "success" } else { "failure" };
            ROUTE_COUNTER
                .with_label_values(&[&self.strategy, status])
                .inc();
        }
    }
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        if !self.completed {
            // Dropped without completion means the route failed
            self.observe(false);
        }
    }
}

// Global metrics instance
lazy_static::lazy_static! {
    pub static ref METRICS: Arc<parking_lot::RwLock<MetricsRecorder>> =
        Arc::new(parking_lot::RwLock::new(MetricsRecorder::new()));
}
