//! Cache metrics for observability

use crate::QueryKey;
use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    fetches: CounterVec,
    errors: CounterVec,
    invalidations: CounterVec,
    discarded: CounterVec,
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: CounterVec::new(
                Opts::new("instafram_query_cache_hits_total", "Reads served from cache"),
                &["resource"],
            )
            .expect("valid metric definition"),
            misses: CounterVec::new(
                Opts::new("instafram_query_cache_misses_total", "Reads that needed a fetch"),
                &["resource"],
            )
            .expect("valid metric definition"),
            fetches: CounterVec::new(
                Opts::new("instafram_query_cache_fetches_total", "Network fetches issued"),
                &["resource", "kind"],
            )
            .expect("valid metric definition"),
            errors: CounterVec::new(
                Opts::new("instafram_query_cache_errors_total", "Failed fetches"),
                &["resource", "kind"],
            )
            .expect("valid metric definition"),
            invalidations: CounterVec::new(
                Opts::new(
                    "instafram_query_cache_invalidations_total",
                    "Entries marked stale",
                ),
                &["resource"],
            )
            .expect("valid metric definition"),
            discarded: CounterVec::new(
                Opts::new(
                    "instafram_query_cache_discarded_total",
                    "Responses dropped because their entry moved on",
                ),
                &["resource"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.fetches.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        registry.register(Box::new(self.invalidations.clone()))?;
        registry.register(Box::new(self.discarded.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Kind of fetch, used as a label
#[derive(Debug, Clone, Copy)]
pub enum FetchKind {
    Resource,
    Page,
}

impl FetchKind {
    fn as_str(&self) -> &'static str {
        match self {
            FetchKind::Resource => "resource",
            FetchKind::Page => "page",
        }
    }
}

/// Cache metrics wrapper
#[derive(Clone, Default)]
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self, key: &QueryKey) {
        get_metrics().hits.with_label_values(&[key.resource()]).inc();
    }

    pub fn record_miss(&self, key: &QueryKey) {
        get_metrics().misses.with_label_values(&[key.resource()]).inc();
    }

    pub fn record_fetch(&self, key: &QueryKey, kind: FetchKind) {
        get_metrics()
            .fetches
            .with_label_values(&[key.resource(), kind.as_str()])
            .inc();
    }

    pub fn record_error(&self, key: &QueryKey, kind: FetchKind) {
        get_metrics()
            .errors
            .with_label_values(&[key.resource(), kind.as_str()])
            .inc();
    }

    pub fn record_invalidation(&self, key: &QueryKey) {
        get_metrics()
            .invalidations
            .with_label_values(&[key.resource()])
            .inc();
    }

    pub fn record_discarded(&self, key: &QueryKey) {
        get_metrics()
            .discarded
            .with_label_values(&[key.resource()])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_record() {
        let registry = Registry::new();
        CacheMetrics::register(&registry).unwrap();

        let metrics = CacheMetrics::new();
        let key = QueryKey::from(["post", "p1"]);
        metrics.record_hit(&key);
        metrics.record_fetch(&key, FetchKind::Resource);

        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "instafram_query_cache_hits_total"));
    }
}
