//! Prometheus request metrics, exported at `/metrics`.

use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};
use once_cell::sync::Lazy;

/// Shared middleware handle; one registry per process.
pub static METRICS: Lazy<PrometheusMetrics> = Lazy::new(|| {
    PrometheusMetricsBuilder::new("warboard")
        .endpoint("/metrics")
        .build()
        .expect("metrics builder")
});
