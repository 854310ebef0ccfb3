//! Prometheus metrics collection for revcaps.
//!
//! - `revcaps_grants_total{key}` - Capability URLs minted per handler key
//! - `revcaps_dispatch_total{outcome}` - Dispatches by outcome (`ok`, `panic`,
//!   or a [`DispatchError`](crate::error::DispatchError) code)
//! - `revcaps_dispatch_duration_seconds` - Dispatch latency, handler included
//! - `revcaps_handler_panics_total{key}` - Handlers that panicked
//!
//! Recording is a no-op until [`init`] has run, so library users that never
//! expose metrics pay nothing.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Capability URLs minted, by handler key.
pub static GRANTS: OnceLock<IntCounterVec> = OnceLock::new();

/// Dispatches, by outcome.
pub static DISPATCHES: OnceLock<IntCounterVec> = OnceLock::new();

/// Dispatch latency.
pub static DISPATCH_LATENCY: OnceLock<Histogram> = OnceLock::new();

/// Handler panics, by handler key.
pub static HANDLER_PANICS: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Safe to call more than once; only the first call registers anything.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                    }
                }
            }
        };
    }

    register!(GRANTS, IntCounterVec::new(Opts::new("revcaps_grants_total", "Capability URLs minted"), &["key"]));
    register!(DISPATCHES, IntCounterVec::new(Opts::new("revcaps_dispatch_total", "Capability dispatches by outcome"), &["outcome"]));
    register!(DISPATCH_LATENCY, Histogram::with_opts(
        HistogramOpts::new("revcaps_dispatch_duration_seconds", "Capability dispatch latency")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])));
    register!(HANDLER_PANICS, IntCounterVec::new(Opts::new("revcaps_handler_panics_total", "Capability handlers that panicked"), &["key"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record a minted capability.
#[inline]
pub fn record_grant(key: &str) {
    if let Some(c) = GRANTS.get() {
        c.with_label_values(&[key]).inc();
    }
}

/// Record a finished dispatch with latency.
#[inline]
pub fn record_dispatch(outcome: &str, duration_secs: f64) {
    if let Some(c) = DISPATCHES.get() {
        c.with_label_values(&[outcome]).inc();
    }
    if let Some(h) = DISPATCH_LATENCY.get() {
        h.observe(duration_secs);
    }
}

/// Record a handler panic.
#[inline]
pub fn record_handler_panic(key: &str) {
    if let Some(c) = HANDLER_PANICS.get() {
        c.with_label_values(&[key]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();
        init();

        record_grant("data");
        record_dispatch("ok", 0.001);
        record_dispatch("parse", 0.0002);
        record_handler_panic("boom");

        let output = gather_metrics();
        assert!(output.contains("revcaps_grants_total"));
        assert!(output.contains(r#"outcome="parse""#));
        assert!(output.contains("revcaps_dispatch_duration_seconds"));
        assert!(output.contains("revcaps_handler_panics_total"));
    }
}
