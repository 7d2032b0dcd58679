//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{
    counter, describe_counter, describe_histogram, gauge, describe_gauge, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all CiteForge metrics
pub const METRICS_PREFIX: &str = "citeforge";

/// Histogram buckets for full pipeline latency (in seconds).
/// Dominated by the enhancement and embedding round-trips.
pub const PIPELINE_BUCKETS: &[f64] = &[
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s - P50 target
    3.000,  // 3s
    5.000,  // 5s - P99 target
    10.00,  // 10s
    20.00,  // 20s
    60.00,  // 60s
];

/// Buckets for embedding latency
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Pipeline metrics
    describe_histogram!(
        format!("{}_pipeline_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end context assembly latency in seconds"
    );

    describe_counter!(
        format!("{}_enhancement_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Query enhancement calls answered with the local fallback"
    );

    describe_histogram!(
        format!("{}_citations_per_context", METRICS_PREFIX),
        Unit::Count,
        "Citations in each assembled context"
    );

    // Search metrics
    describe_counter!(
        format!("{}_search_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Total namespace search calls dispatched"
    );

    describe_counter!(
        format!("{}_namespace_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Namespace search calls that failed and contributed no results"
    );

    describe_gauge!(
        format!("{}_search_candidates_count", METRICS_PREFIX),
        Unit::Count,
        "Raw candidates returned per knowledge base in the last request"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    // Context store metrics
    describe_counter!(
        format!("{}_store_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total context store hits"
    );

    describe_counter!(
        format!("{}_store_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total context store misses"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record a completed pipeline run
pub fn record_pipeline(duration_secs: f64, citation_count: usize) {
    histogram!(format!("{}_pipeline_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    histogram!(format!("{}_citations_per_context", METRICS_PREFIX)).record(citation_count as f64);
}

/// Helper to record an enhancement fallback
pub fn record_enhancement_fallback(reason: &str) {
    counter!(
        format!("{}_enhancement_fallbacks_total", METRICS_PREFIX),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Helper to record a namespace search call
pub fn record_search_call(knowledge_base: &str, success: bool) {
    counter!(
        format!("{}_search_calls_total", METRICS_PREFIX),
        "knowledge_base" => knowledge_base.to_string()
    )
    .increment(1);

    if !success {
        counter!(
            format!("{}_namespace_failures_total", METRICS_PREFIX),
            "knowledge_base" => knowledge_base.to_string()
        )
        .increment(1);
    }
}

/// Helper to record raw candidate counts for a knowledge base
pub fn record_candidates(knowledge_base: &str, count: usize) {
    gauge!(
        format!("{}_search_candidates_count", METRICS_PREFIX),
        "knowledge_base" => knowledge_base.to_string()
    )
    .set(count as f64);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record context store lookups
pub fn record_store_lookup(hit: bool, backend: &str) {
    if hit {
        counter!(
            format!("{}_store_hits_total", METRICS_PREFIX),
            "backend" => backend.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_store_misses_total", METRICS_PREFIX),
            "backend" => backend.to_string()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [PIPELINE_BUCKETS, EMBEDDING_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("POST", "/v1/context/search");
        std::thread::sleep(std::time::Duration::from_millis(10));
        metrics.finish(200);
        // Just verify it runs without panic
    }
}
