// Metrics and observability module
// This file handles collection and reporting of upstream call latency,
// per-venue quote outcomes and execution outcomes
//
// Numan Thabit 2025 Nov

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

pub static REQ_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "aggr_request_latency_seconds",
        "latency for upstream calls",
        &["service", "method"]
    )
    .unwrap()
});

pub static REQ_ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aggr_request_errors_total",
        "errors by upstream",
        &["service", "method"]
    )
    .unwrap()
});

pub static VENUE_QUOTE_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "aggr_venue_quote_latency_seconds",
        "latency of settled venue quote calls",
        &["venue"]
    )
    .unwrap()
});

pub static VENUE_QUOTE_FAILURES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aggr_venue_quote_failures_total",
        "venue quotes excluded from selection",
        &["venue", "reason"]
    )
    .unwrap()
});

pub static EXECUTIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aggr_executions_total",
        "swap executions by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Render the default registry in the prometheus text format.
pub fn render() -> String {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buf) {
        tracing::warn!(error = %err, "metrics encoding failed");
    }
    String::from_utf8(buf).unwrap_or_default()
}
