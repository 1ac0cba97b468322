//! Process-wide counters, gauges and histograms with Prometheus text exposition.
//!
//! A [`MetricsRegistry`] is created once at startup and handed to whatever
//! records into it. Individual metrics are `Arc`s so hot paths update them
//! with plain atomics and never touch the registry lock.

use crate::error::MetricsError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Prometheus client default latency buckets, in seconds.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn label_set(names: &[&str], values: &[String]) -> String {
    names
        .iter()
        .zip(values)
        .map(|(name, value)| format!("{name}=\"{}\"", escape_label(value)))
        .collect::<Vec<_>>()
        .join(",")
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Monotonically increasing count.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Point-in-time value stored as `f64` bits.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn add(&self, delta: f64) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + delta).to_bits())
            });
    }

    pub fn inc(&self) {
        self.add(1.0);
    }

    pub fn dec(&self) {
        self.add(-1.0);
    }
}

#[derive(Debug)]
pub struct Histogram {
    bounds: Vec<f64>,
    buckets: Vec<AtomicU64>,
    sum: Gauge,
    count: AtomicU64,
}

impl Histogram {
    fn new(bounds: &[f64]) -> Self {
        Self {
            bounds: bounds.to_vec(),
            buckets: bounds.iter().map(|_| AtomicU64::new(0)).collect(),
            sum: Gauge::default(),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        if let Some(idx) = self.bounds.iter().position(|bound| value <= *bound) {
            self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        }
        self.sum.add(value);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> f64 {
        self.sum.get()
    }
}

/// A family of metrics of type `M` keyed by `N` label values.
#[derive(Debug)]
pub struct Labeled<M, const N: usize> {
    label_names: [&'static str; N],
    children: RwLock<BTreeMap<Vec<String>, Arc<M>>>,
}

pub type CounterVec<const N: usize> = Labeled<Counter, N>;
pub type GaugeVec<const N: usize> = Labeled<Gauge, N>;

impl<M: Default, const N: usize> Labeled<M, N> {
    fn new(label_names: [&'static str; N]) -> Self {
        Self {
            label_names,
            children: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_label_values(&self, values: [&str; N]) -> Arc<M> {
        let key: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        if let Some(child) = self.children.read().get(&key) {
            return Arc::clone(child);
        }
        Arc::clone(self.children.write().entry(key).or_default())
    }

    pub fn get(&self, values: [&str; N]) -> Option<Arc<M>> {
        let key: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        self.children.read().get(&key).cloned()
    }
}

trait Collect: Send + Sync {
    fn kind(&self) -> &'static str;
    fn write_samples(&self, name: &str, out: &mut String);
}

impl Collect for Counter {
    fn kind(&self) -> &'static str {
        "counter"
    }

    fn write_samples(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "{name} {}", self.get());
    }
}

impl Collect for Gauge {
    fn kind(&self) -> &'static str {
        "gauge"
    }

    fn write_samples(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "{name} {}", format_value(self.get()));
    }
}

impl Collect for Histogram {
    fn kind(&self) -> &'static str {
        "histogram"
    }

    fn write_samples(&self, name: &str, out: &mut String) {
        let mut cumulative = 0;
        for (bound, bucket) in self.bounds.iter().zip(&self.buckets) {
            cumulative += bucket.load(Ordering::Relaxed);
            let _ = writeln!(
                out,
                "{name}_bucket{{le=\"{}\"}} {cumulative}",
                format_value(*bound)
            );
        }
        let count = self.count();
        let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {count}");
        let _ = writeln!(out, "{name}_sum {}", format_value(self.sum()));
        let _ = writeln!(out, "{name}_count {count}");
    }
}

impl<const N: usize> Collect for CounterVec<N> {
    fn kind(&self) -> &'static str {
        "counter"
    }

    fn write_samples(&self, name: &str, out: &mut String) {
        for (values, counter) in self.children.read().iter() {
            let labels = label_set(&self.label_names, values);
            let _ = writeln!(out, "{name}{{{labels}}} {}", counter.get());
        }
    }
}

impl<const N: usize> Collect for GaugeVec<N> {
    fn kind(&self) -> &'static str {
        "gauge"
    }

    fn write_samples(&self, name: &str, out: &mut String) {
        for (values, gauge) in self.children.read().iter() {
            let labels = label_set(&self.label_names, values);
            let _ = writeln!(out, "{name}{{{labels}}} {}", format_value(gauge.get()));
        }
    }
}

struct Family {
    name: String,
    help: String,
    metric: Arc<dyn Collect>,
}

/// Ordered set of named metric families.
#[derive(Default)]
pub struct MetricsRegistry {
    families: RwLock<Vec<Family>>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let families = self.families.read();
        f.debug_struct("MetricsRegistry")
            .field(
                "families",
                &families.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register<M: Collect + 'static>(
        &self,
        name: &str,
        help: &str,
        metric: M,
    ) -> Result<Arc<M>, MetricsError> {
        if !valid_name(name) {
            return Err(MetricsError::InvalidName(name.to_string()));
        }
        let mut families = self.families.write();
        if families.iter().any(|f| f.name == name) {
            return Err(MetricsError::AlreadyRegistered(name.to_string()));
        }
        let metric = Arc::new(metric);
        families.push(Family {
            name: name.to_string(),
            help: help.to_string(),
            metric: metric.clone(),
        });
        Ok(metric)
    }

    pub fn counter(&self, name: &str, help: &str) -> Result<Arc<Counter>, MetricsError> {
        self.register(name, help, Counter::default())
    }

    pub fn gauge(&self, name: &str, help: &str) -> Result<Arc<Gauge>, MetricsError> {
        self.register(name, help, Gauge::default())
    }

    pub fn histogram(
        &self,
        name: &str,
        help: &str,
        bounds: &[f64],
    ) -> Result<Arc<Histogram>, MetricsError> {
        if bounds.is_empty() || bounds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(MetricsError::InvalidBuckets(name.to_string()));
        }
        self.register(name, help, Histogram::new(bounds))
    }

    pub fn counter_vec<const N: usize>(
        &self,
        name: &str,
        help: &str,
        label_names: [&'static str; N],
    ) -> Result<Arc<CounterVec<N>>, MetricsError> {
        self.register(name, help, Labeled::new(label_names))
    }

    pub fn gauge_vec<const N: usize>(
        &self,
        name: &str,
        help: &str,
        label_names: [&'static str; N],
    ) -> Result<Arc<GaugeVec<N>>, MetricsError> {
        self.register(name, help, Labeled::new(label_names))
    }

    pub fn len(&self) -> usize {
        self.families.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.read().is_empty()
    }

    /// Text exposition format, version 0.0.4.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for family in self.families.read().iter() {
            let _ = writeln!(out, "# HELP {} {}", family.name, family.help.replace('\n', " "));
            let _ = writeln!(out, "# TYPE {} {}", family.name, family.metric.kind());
            family.metric.write_samples(&family.name, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_inc_dec_set() {
        let gauge = Gauge::default();
        gauge.inc();
        gauge.inc();
        gauge.dec();
        assert_eq!(gauge.get(), 1.0);
        gauge.set(-2.5);
        assert_eq!(gauge.get(), -2.5);
    }

    #[test]
    fn test_duplicate_and_invalid_names_are_rejected() {
        let registry = MetricsRegistry::new();
        registry.counter("requests_total", "Requests").unwrap();
        assert!(matches!(
            registry.gauge("requests_total", "Again"),
            Err(MetricsError::AlreadyRegistered(_))
        ));
        assert!(matches!(
            registry.gauge("2bad-name", "Bad"),
            Err(MetricsError::InvalidName(_))
        ));
        assert!(matches!(
            registry.histogram("latency", "Bad buckets", &[1.0, 0.5]),
            Err(MetricsError::InvalidBuckets(_))
        ));
    }

    #[test]
    fn test_render_counter_vec_and_gauge() {
        let registry = MetricsRegistry::new();
        let counter = registry
            .counter_vec("predictions_total", "Total predictions", ["sentiment", "status"])
            .unwrap();
        let gauge = registry.gauge("score", "Current score").unwrap();
        counter.with_label_values(["Positive", "success"]).inc();
        counter.with_label_values(["Positive", "success"]).inc();
        gauge.set(0.5);

        let text = registry.render();
        assert!(text.contains("# HELP predictions_total Total predictions\n"));
        assert!(text.contains("# TYPE predictions_total counter\n"));
        assert!(text.contains("predictions_total{sentiment=\"Positive\",status=\"success\"} 2\n"));
        assert!(text.contains("# TYPE score gauge\nscore 0.5\n"));
    }

    #[test]
    fn test_histogram_buckets_are_cumulative() {
        let registry = MetricsRegistry::new();
        let histogram = registry
            .histogram("duration_seconds", "Duration", &[0.1, 1.0])
            .unwrap();
        histogram.observe(0.0625);
        histogram.observe(0.5);
        histogram.observe(7.0);

        let text = registry.render();
        assert!(text.contains("duration_seconds_bucket{le=\"0.1\"} 1\n"));
        assert!(text.contains("duration_seconds_bucket{le=\"1\"} 2\n"));
        assert!(text.contains("duration_seconds_bucket{le=\"+Inf\"} 3\n"));
        assert!(text.contains("duration_seconds_sum 7.5625\n"));
        assert!(text.contains("duration_seconds_count 3\n"));
    }

    #[test]
    fn test_label_values_are_escaped() {
        assert_eq!(escape_label("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
    }
}
