//! Request metrics: a counter and a latency histogram, exposed in the
//! Prometheus text format.
//!
//! # Series
//! - `http_requests_total{method, endpoint, status}` (counter)
//! - `http_request_duration_seconds{method, endpoint}` (histogram, buckets
//!   0.1, 0.5, 1, 2, 5 seconds)
//! - `process_*` (CPU, resident memory, open fds, start time; Linux only)
//!
//! `endpoint` is always a registered route pattern or `unmatched`, never a raw
//! path, and `method` is folded to `OTHER` for non-standard methods, so the
//! number of series is bounded by the routing table.
//!
//! The registry is an ordinary value, not a process global. Create one per
//! process (or per test) and share it with `Arc`.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::proto::{Metric, MetricFamily};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::middleware::{Observer, RequestObservation};

/// Upper bounds (seconds) of the duration histogram buckets.
pub const DURATION_BUCKETS: [f64; 5] = [0.1, 0.5, 1.0, 2.0, 5.0];

/// Point-in-time copy of one histogram series.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramSnapshot {
    /// Cumulative bucket counts, aligned with [`DURATION_BUCKETS`].
    pub buckets: Vec<u64>,
    pub count: u64,
    pub sum: f64,
}

/// Request counters and duration histograms on an owned Prometheus registry.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    requests: IntCounterVec,
    durations: HistogramVec,
}

impl MetricsRegistry {
    /// Creates a registry with the request series and, on Linux, the process
    /// collector registered.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric cannot be registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests"),
            &["method", "endpoint", "status"],
        )?;
        registry.register(Box::new(requests.clone()))?;

        let durations = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request duration in seconds")
                .buckets(DURATION_BUCKETS.to_vec()),
            &["method", "endpoint"],
        )?;
        registry.register(Box::new(durations.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))?;

        Ok(Self { registry, requests, durations })
    }

    /// Adds one to the `{method, endpoint, status}` counter, creating it at 1.
    pub fn increment_request_count(&self, method: &str, route: &str, status: &str) {
        self.requests.with_label_values(&[method, route, status]).inc();
    }

    /// Records one duration sample for `{method, endpoint}`.
    ///
    /// Negative or non-finite samples are recorded as zero.
    pub fn observe_duration(&self, method: &str, route: &str, seconds: f64) {
        let seconds = if seconds.is_finite() && seconds > 0.0 { seconds } else { 0.0 };
        self.durations.with_label_values(&[method, route]).observe(seconds);
    }

    /// Current value of one counter series, `0` if it was never incremented.
    ///
    /// Reads through the collector so that looking does not create the series.
    pub fn request_count(&self, method: &str, route: &str, status: &str) -> u64 {
        let families = self.requests.collect();
        find(&families, &[("method", method), ("endpoint", route), ("status", status)])
            .map_or(0, |m| m.get_counter().get_value() as u64)
    }

    /// Number of distinct counter series.
    pub fn counter_series(&self) -> usize {
        self.requests.collect().iter().map(|f| f.get_metric().len()).sum()
    }

    pub fn histogram(&self, method: &str, route: &str) -> Option<HistogramSnapshot> {
        let families = self.durations.collect();
        let h = find(&families, &[("method", method), ("endpoint", route)])?.get_histogram();
        Some(HistogramSnapshot {
            buckets: h.get_bucket().iter().map(|b| b.get_cumulative_count()).collect(),
            count: h.get_sample_count(),
            sum: h.get_sample_sum(),
        })
    }

    /// Every metric family on the registry.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Encodes every family in the text exposition format.
    pub fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

fn find<'a>(families: &'a [MetricFamily], wanted: &[(&str, &str)]) -> Option<&'a Metric> {
    families.iter()
        .flat_map(|f| f.get_metric())
        .find(|m| {
            wanted.iter().all(|(name, value)| {
                m.get_label().iter().any(|l| l.get_name() == *name && l.get_value() == *value)
            })
        })
}

/// Feeds completed requests into a [`MetricsRegistry`].
pub struct MetricsObserver {
    registry: Arc<MetricsRegistry>,
}

impl MetricsObserver {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }
}

impl Observer for MetricsObserver {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn observe(&self, observation: &RequestObservation) {
        let labels = observation.labels();
        self.registry.increment_request_count(labels.method, labels.route, labels.status);
        self.registry.observe_duration(
            labels.method,
            labels.route,
            observation.duration.as_secs_f64(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(reg: &MetricsRegistry) -> String {
        String::from_utf8(reg.render().unwrap()).unwrap()
    }

    #[test]
    fn counter_starts_at_one_and_accumulates() {
        let reg = MetricsRegistry::new().unwrap();
        assert_eq!(reg.request_count("GET", "/users/{id}", "200"), 0);
        assert_eq!(reg.counter_series(), 0);

        reg.increment_request_count("GET", "/users/{id}", "200");
        reg.increment_request_count("GET", "/users/{id}", "200");
        reg.increment_request_count("GET", "/users/{id}", "404");

        assert_eq!(reg.request_count("GET", "/users/{id}", "200"), 2);
        assert_eq!(reg.request_count("GET", "/users/{id}", "404"), 1);
        assert_eq!(reg.counter_series(), 2);
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let reg = MetricsRegistry::new().unwrap();
        reg.observe_duration("GET", "/", 0.05);
        reg.observe_duration("GET", "/", 0.7);
        reg.observe_duration("GET", "/", 1.0);
        reg.observe_duration("GET", "/", 9.0);

        let snap = reg.histogram("GET", "/").unwrap();
        assert_eq!(snap.buckets, [1, 1, 3, 3, 3]);
        assert_eq!(snap.count, 4);
        assert!((snap.sum - 10.75).abs() < 1e-9);
    }

    #[test]
    fn bad_samples_are_clamped_to_zero() {
        let reg = MetricsRegistry::new().unwrap();
        reg.observe_duration("GET", "/", -1.0);
        reg.observe_duration("GET", "/", f64::NAN);

        let snap = reg.histogram("GET", "/").unwrap();
        assert_eq!(snap.buckets, [2, 2, 2, 2, 2]);
        assert_eq!(snap.sum, 0.0);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let reg = Arc::new(MetricsRegistry::new().unwrap());
        let threads: Vec<_> = (0..10)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        reg.increment_request_count("GET", "/health", "200");
                        reg.observe_duration("GET", "/health", 0.001);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(reg.request_count("GET", "/health", "200"), 1000);
        let snap = reg.histogram("GET", "/health").unwrap();
        assert_eq!(snap.count, 1000);
        assert!((snap.sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn registries_are_independent() {
        let a = MetricsRegistry::new().unwrap();
        let b = MetricsRegistry::new().unwrap();
        a.increment_request_count("GET", "/", "200");

        assert_eq!(a.request_count("GET", "/", "200"), 1);
        assert_eq!(b.request_count("GET", "/", "200"), 0);
    }

    #[test]
    fn renders_prometheus_text() {
        let reg = MetricsRegistry::new().unwrap();
        reg.increment_request_count("GET", "/users/{id}", "200");
        reg.observe_duration("GET", "/users/{id}", 0.3);

        let text = rendered(&reg);
        assert!(text.contains("# TYPE http_requests_total counter\n"));
        assert!(text.contains(r#"http_requests_total{endpoint="/users/{id}",method="GET",status="200"} 1"#));
        assert!(text.contains("# TYPE http_request_duration_seconds histogram\n"));
        assert!(text.contains(r#"http_request_duration_seconds_bucket{endpoint="/users/{id}",method="GET",le="0.1"} 0"#));
        assert!(text.contains(r#"http_request_duration_seconds_bucket{endpoint="/users/{id}",method="GET",le="0.5"} 1"#));
        assert!(text.contains(r#"http_request_duration_seconds_bucket{endpoint="/users/{id}",method="GET",le="+Inf"} 1"#));
        assert!(text.contains(r#"http_request_duration_seconds_count{endpoint="/users/{id}",method="GET"} 1"#));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn exports_process_metrics() {
        let reg = MetricsRegistry::new().unwrap();
        let text = rendered(&reg);
        assert!(text.contains("process_start_time_seconds"));
        assert!(text.contains("process_resident_memory_bytes"));
    }
}
