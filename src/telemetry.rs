//! Telemetry utilities: subscriber setup, dispatch timing, and spans.

use crate::config::LogFormat;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default `info` filter. Output goes to stderr so
/// CLI results on stdout stay clean.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Guard for timing a dispatch and recording metrics.
pub struct DispatchTimer {
    start: Instant,
}

impl DispatchTimer {
    /// Start timing a dispatch.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Stop the timer and record the dispatch under `outcome`.
    pub fn finish(self, outcome: &str) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_dispatch(outcome, duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Create a span for one capability request.
    pub fn cap_request(remote: &str, method: &str, uri: &str) -> Span {
        info_span!("cap_request", remote = %remote, method = %method, uri = %uri)
    }

    /// Create a span for the listener.
    pub fn listener(addr: &str) -> Span {
        info_span!("listener", addr = %addr)
    }
}
