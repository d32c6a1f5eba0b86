//! Search performance metrics stored in the shared key-value store
//!
//! Response times are kept as capped per-mode sample lists; everything else is a counter
//! whose expiry is pushed back on every increment. Recording is best-effort: callers log
//! and drop errors from this module.

use crate::config::SearchConfig;
use crate::error::Result;
use crate::kv::KeyValueStore;
use crate::types::SearchMode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const KEY_PREFIX: &str = "search_metrics";
const CACHE_HITS: &str = "cache_hits";
const CACHE_MISSES: &str = "cache_misses";
const API_CALLS: &str = "api_calls";

/// Nearest-rank percentile over ascending `sorted` samples
///
/// Uses `index = ceil(p / 100 * n) - 1`, clamped to the sample range.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let rank = (p / 100.0 * n as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, n as i64 - 1) as usize;
    Some(sorted[index])
}

/// Response-time percentiles for one mode, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseTimePercentiles {
    /// Number of samples the percentiles were computed from
    pub samples: usize,
    /// Median
    pub p50: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
}

/// Counters and latencies for one search mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeMetrics {
    /// The mode described
    pub mode: SearchMode,
    /// Searches answered in this mode
    pub searches: u64,
    /// Searches that returned no product
    pub empty_results: u64,
    /// `empty_results / searches`, 0 without searches
    pub empty_result_rate: f64,
    /// Response-time percentiles
    pub response_times: ResponseTimePercentiles,
}

/// Snapshot of every metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Per-mode figures
    pub modes: Vec<ModeMetrics>,
    /// Query-embedding cache hits
    pub cache_hits: u64,
    /// Query-embedding cache misses
    pub cache_misses: u64,
    /// `cache_hits / (cache_hits + cache_misses)`
    pub cache_hit_rate: f64,
    /// Calls made to the embedding provider
    pub api_calls: u64,
    /// Approximation from a fixed assumed token count per query, not billed usage
    pub estimated_cost_usd: f64,
}

/// Records search latencies, counters and the embedding cost estimate
pub struct SearchMetricsCollector {
    store: Arc<dyn KeyValueStore>,
    sample_cap: usize,
    counter_ttl: Duration,
    tokens_per_query: u64,
    price_per_token_usd: f64,
}

impl std::fmt::Debug for SearchMetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchMetricsCollector")
            .field("sample_cap", &self.sample_cap)
            .field("counter_ttl", &self.counter_ttl)
            .finish()
    }
}

impl SearchMetricsCollector {
    /// Collector using the limits and cost constants from `config`
    pub fn new(store: Arc<dyn KeyValueStore>, config: &SearchConfig) -> Self {
        Self {
            store,
            sample_cap: config.metrics_sample_cap,
            counter_ttl: config.metrics_counter_ttl(),
            tokens_per_query: config.assumed_tokens_per_query,
            price_per_token_usd: config.price_per_token_usd,
        }
    }

    fn key(name: &str) -> String {
        format!("{KEY_PREFIX}:{name}")
    }

    fn mode_key(kind: &str, mode: SearchMode) -> String {
        format!("{KEY_PREFIX}:{kind}:{}", mode.as_str())
    }

    async fn bump(&self, key: &str) -> Result<i64> {
        let value = self.store.incr(key).await?;
        self.store.expire(key, self.counter_ttl).await?;
        Ok(value)
    }

    async fn counter(&self, key: &str) -> Result<u64> {
        Ok(self
            .store
            .get(key)
            .await?
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0))
    }

    /// Record one completed search
    pub async fn record_search(
        &self,
        mode: SearchMode,
        execution_time_ms: f64,
        result_count: usize,
    ) -> Result<()> {
        self.store
            .push_capped(
                &Self::mode_key("response_times", mode),
                execution_time_ms.to_string(),
                self.sample_cap,
            )
            .await?;
        self.bump(&Self::mode_key("searches", mode)).await?;
        if result_count == 0 {
            self.bump(&Self::mode_key("empty_results", mode)).await?;
        }
        Ok(())
    }

    /// Record a query-embedding cache hit
    pub async fn record_cache_hit(&self) -> Result<()> {
        self.bump(&Self::key(CACHE_HITS)).await.map(|_| ())
    }

    /// Record a query-embedding cache miss
    pub async fn record_cache_miss(&self) -> Result<()> {
        self.bump(&Self::key(CACHE_MISSES)).await.map(|_| ())
    }

    /// Record a call to the embedding provider
    pub async fn record_api_call(&self) -> Result<()> {
        self.bump(&Self::key(API_CALLS)).await.map(|_| ())
    }

    /// Response-time percentiles for a mode
    pub async fn response_times(&self, mode: SearchMode) -> Result<ResponseTimePercentiles> {
        let mut samples: Vec<f64> = self
            .store
            .list(&Self::mode_key("response_times", mode))
            .await?
            .iter()
            .filter_map(|s| s.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .collect();
        samples.sort_by(|a, b| a.total_cmp(b));

        Ok(ResponseTimePercentiles {
            samples: samples.len(),
            p50: percentile(&samples, 50.0).unwrap_or(0.0),
            p95: percentile(&samples, 95.0).unwrap_or(0.0),
            p99: percentile(&samples, 99.0).unwrap_or(0.0),
        })
    }

    /// Estimated embedding spend for `api_calls` provider calls
    pub fn estimated_cost_usd(&self, api_calls: u64) -> f64 {
        api_calls as f64 * self.tokens_per_query as f64 * self.price_per_token_usd
    }

    /// Snapshot of all metrics
    pub async fn report(&self) -> Result<MetricsReport> {
        let mut modes = Vec::new();
        for mode in SearchMode::all() {
            let searches = self.counter(&Self::mode_key("searches", mode)).await?;
            let empty_results = self.counter(&Self::mode_key("empty_results", mode)).await?;
            modes.push(ModeMetrics {
                mode,
                searches,
                empty_results,
                empty_result_rate: ratio(empty_results, searches),
                response_times: self.response_times(mode).await?,
            });
        }

        let cache_hits = self.counter(&Self::key(CACHE_HITS)).await?;
        let cache_misses = self.counter(&Self::key(CACHE_MISSES)).await?;
        let api_calls = self.counter(&Self::key(API_CALLS)).await?;

        Ok(MetricsReport {
            modes,
            cache_hits,
            cache_misses,
            cache_hit_rate: ratio(cache_hits, cache_hits + cache_misses),
            api_calls,
            estimated_cost_usd: self.estimated_cost_usd(api_calls),
        })
    }

    /// Delete every metric key
    pub async fn reset(&self) -> Result<()> {
        for mode in SearchMode::all() {
            for kind in ["response_times", "searches", "empty_results"] {
                self.store.delete(&Self::mode_key(kind, mode)).await?;
            }
        }
        for name in [CACHE_HITS, CACHE_MISSES, API_CALLS] {
            self.store.delete(&Self::key(name)).await?;
        }
        tracing::info!("Search metrics reset");
        Ok(())
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKeyValueStore;

    fn collector_with(config: SearchConfig) -> (SearchMetricsCollector, InMemoryKeyValueStore) {
        let store = InMemoryKeyValueStore::new();
        (
            SearchMetricsCollector::new(Arc::new(store.clone()), &config),
            store,
        )
    }

    #[test]
    fn test_nearest_rank_percentile() {
        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&samples, 50.0), Some(50.0));
        assert_eq!(percentile(&samples, 95.0), Some(95.0));
        assert_eq!(percentile(&samples, 99.0), Some(99.0));
        assert_eq!(percentile(&samples, 0.0), Some(1.0));
        assert_eq!(percentile(&[], 50.0), None);
        assert_eq!(percentile(&[7.0], 99.0), Some(7.0));
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 50.0), Some(2.0));
    }

    #[tokio::test]
    async fn test_record_and_report() {
        let (collector, _) = collector_with(SearchConfig::default());
        for ms in [10.0, 20.0, 30.0, 40.0] {
            collector
                .record_search(SearchMode::Semantic, ms, 3)
                .await
                .unwrap();
        }
        collector
            .record_search(SearchMode::Keyword, 5.0, 0)
            .await
            .unwrap();
        collector.record_cache_hit().await.unwrap();
        collector.record_cache_miss().await.unwrap();
        collector.record_api_call().await.unwrap();

        let report = collector.report().await.unwrap();
        let semantic = &report.modes[0];
        assert_eq!(semantic.mode, SearchMode::Semantic);
        assert_eq!(semantic.searches, 4);
        assert_eq!(semantic.empty_results, 0);
        assert_eq!(semantic.response_times.p50, 20.0);
        assert_eq!(semantic.response_times.p99, 40.0);

        let keyword = &report.modes[1];
        assert_eq!(keyword.empty_results, 1);
        assert_eq!(keyword.empty_result_rate, 1.0);

        assert_eq!(report.cache_hit_rate, 0.5);
        assert_eq!(report.api_calls, 1);
        assert!((report.estimated_cost_usd - 10.0 * 0.000_000_02).abs() < 1e-15);
    }

    #[tokio::test]
    async fn test_samples_are_capped() {
        let (collector, _) = collector_with(SearchConfig {
            metrics_sample_cap: 3,
            ..Default::default()
        });
        for ms in [1.0, 2.0, 3.0, 4.0, 5.0] {
            collector
                .record_search(SearchMode::Semantic, ms, 1)
                .await
                .unwrap();
        }

        let times = collector.response_times(SearchMode::Semantic).await.unwrap();
        assert_eq!(times.samples, 3);
        assert_eq!(times.p50, 4.0);
    }

    #[tokio::test]
    async fn test_counters_carry_ttl() {
        let (collector, store) = collector_with(SearchConfig::default());
        collector.record_api_call().await.unwrap();
        let ttl = store.ttl("search_metrics:api_calls").unwrap();
        assert!(ttl > Duration::from_secs(86_000));
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let (collector, store) = collector_with(SearchConfig::default());
        collector
            .record_search(SearchMode::Keyword, 12.0, 0)
            .await
            .unwrap();
        collector.record_cache_hit().await.unwrap();

        collector.reset().await.unwrap();
        assert!(store.is_empty());
        let report = collector.report().await.unwrap();
        assert_eq!(report.modes[1].searches, 0);
        assert_eq!(report.cache_hits, 0);
    }
}
