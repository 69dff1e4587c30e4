//! Prometheus metrics for collaborator calls.
//!
//! Every outbound call to a collaborator (teams backend, hookd, clusters, dependencytrack, the
//! database) is wrapped in [`instrument`], which records its latency labelled with the
//! collaborator, the operation and whether it succeeded. HTTP metrics come from
//! `axum-prometheus`; both are served on `/internal/metrics`.

use std::{future::Future, time::Instant};

use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramVec, IntCounterVec, TextEncoder, register_histogram_vec, register_int_counter_vec};
use tracing::Instrument;

static COLLABORATOR_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "console_collaborator_request_duration_seconds",
        "Latency of requests to collaborators (seconds)",
        &["collaborator", "operation", "outcome"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register console_collaborator_request_duration_seconds metric")
});

static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("console_cache_lookups_total", "Cache lookups by cache and result", &["cache", "result"])
        .expect("Failed to register console_cache_lookups_total metric")
});

/// Time `future`, a call to `collaborator`, and record the result. The result is returned unchanged.
pub async fn instrument<T, E, F>(collaborator: &'static str, operation: &'static str, future: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let result = future
        .instrument(tracing::debug_span!("collaborator", collaborator, operation))
        .await;

    let outcome = if result.is_ok() { "ok" } else { "error" };
    COLLABORATOR_REQUEST_DURATION
        .with_label_values(&[collaborator, operation, outcome])
        .observe(started.elapsed().as_secs_f64());
    result
}

/// Record whether a cache lookup was served from the cache.
pub fn record_cache_lookup(cache: &'static str, hit: bool) {
    CACHE_LOOKUPS
        .with_label_values(&[cache, if hit { "hit" } else { "miss" }])
        .inc();
}

/// Render every metric in the default registry in the Prometheus text format.
pub fn render() -> String {
    let mut buffer = vec![];
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
