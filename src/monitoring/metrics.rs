//! Prometheus counters, compiled in with the `metrics` feature and no-ops otherwise.

#[cfg(feature = "metrics")]
mod registry {
    use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
    use std::sync::LazyLock;
    use tracing::warn;

    pub(super) struct Metrics {
        registry: Registry,
        pub(super) cache_lookups: IntCounterVec,
        pub(super) upstream_calls: IntCounterVec,
    }

    impl Metrics {
        fn new() -> prometheus::Result<Self> {
            let registry = Registry::new();
            let cache_lookups = IntCounterVec::new(
                Opts::new("ltp_cache_lookups_total", "Symbol cache probes by result"),
                &["result"],
            )?;
            let upstream_calls = IntCounterVec::new(
                Opts::new("ltp_upstream_calls_total", "Batched upstream ticker calls by outcome"),
                &["outcome"],
            )?;
            registry.register(Box::new(cache_lookups.clone()))?;
            registry.register(Box::new(upstream_calls.clone()))?;

            Ok(Self {
                registry,
                cache_lookups,
                upstream_calls,
            })
        }

        pub(super) fn render(&self) -> Option<String> {
            let mut buf = Vec::new();
            TextEncoder::new()
                .encode(&self.registry.gather(), &mut buf)
                .ok()?;
            String::from_utf8(buf).ok()
        }
    }

    pub(super) static METRICS: LazyLock<Option<Metrics>> = LazyLock::new(|| {
        Metrics::new()
            .map_err(|e| warn!("Failed to register metrics: {}", e))
            .ok()
    });
}

#[cfg(feature = "metrics")]
pub fn record_cache_lookup(hit: bool) {
    if let Some(m) = registry::METRICS.as_ref() {
        m.cache_lookups
            .with_label_values(&[if hit { "hit" } else { "miss" }])
            .inc();
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_cache_lookup(_hit: bool) {}

#[cfg(feature = "metrics")]
pub fn record_upstream_call(ok: bool) {
    if let Some(m) = registry::METRICS.as_ref() {
        m.upstream_calls
            .with_label_values(&[if ok { "ok" } else { "error" }])
            .inc();
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_upstream_call(_ok: bool) {}

/// Text exposition of all counters, or `None` when metrics are compiled out.
#[cfg(feature = "metrics")]
pub fn render() -> Option<String> {
    registry::METRICS.as_ref().and_then(|m| m.render())
}

#[cfg(not(feature = "metrics"))]
pub fn render() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_matches_feature() {
        record_cache_lookup(true);
        record_upstream_call(false);
        let rendered = render();

        if cfg!(feature = "metrics") {
            let text = rendered.expect("metrics enabled");
            assert!(text.contains("ltp_cache_lookups_total"));
            assert!(text.contains("ltp_upstream_calls_total"));
        } else {
            assert!(rendered.is_none());
        }
    }
}
