use crate::push::PushGateway;
use crate::registry::{Gauge, MetricsRegistry};
use crate::Result;
use inference::{LabeledPrediction, SentimentLabel};
use std::sync::Arc;
use std::time::Duration;

/// Business ratios derived from one batch of records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateSnapshot {
    pub total: usize,
    pub positive_ratio: f64,
    pub negative_ratio: f64,
    pub avg_confidence: f64,
}

impl AggregateSnapshot {
    /// `None` for an empty batch.
    pub fn from_records<R: LabeledPrediction>(records: &[R]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }

        let total = records.len();
        let (mut positive, mut negative, mut confidence_sum) = (0usize, 0usize, 0.0);
        for record in records {
            match record.label() {
                SentimentLabel::Positive => positive += 1,
                SentimentLabel::Negative => negative += 1,
                SentimentLabel::Error => {}
            }
            confidence_sum += record.confidence();
        }

        let n = total as f64;
        Some(Self {
            total,
            positive_ratio: positive as f64 / n,
            negative_ratio: negative as f64 / n,
            avg_confidence: confidence_sum / n,
        })
    }
}

/// Gauges set periodically from recent records, for push or pull export.
///
/// Owns its registry so that exactly these gauges are pushed.
#[derive(Debug)]
pub struct AggregateMetrics {
    registry: Arc<MetricsRegistry>,
    pub positive_ratio: Arc<Gauge>,
    pub negative_ratio: Arc<Gauge>,
    pub avg_confidence: Arc<Gauge>,
    pub throughput: Arc<Gauge>,
}

impl AggregateMetrics {
    pub fn new() -> Result<Self> {
        Self::register(Arc::new(MetricsRegistry::new()))
    }

    pub fn register(registry: Arc<MetricsRegistry>) -> Result<Self> {
        Ok(Self {
            positive_ratio: registry
                .gauge("sentiment_positive_ratio", "Ratio of positive predictions")?,
            negative_ratio: registry
                .gauge("sentiment_negative_ratio", "Ratio of negative predictions")?,
            avg_confidence: registry
                .gauge("sentiment_avg_confidence", "Average prediction confidence")?,
            throughput: registry.gauge("prediction_throughput", "Predictions per minute")?,
            registry,
        })
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    /// Replaces the gateway's copy of these gauges.
    pub async fn push(&self, gateway: &PushGateway) -> Result<()> {
        gateway.push(&self.registry).await
    }

    /// Sets the ratio gauges from `records`. An empty batch leaves every gauge as it was.
    pub fn compute<R: LabeledPrediction>(&self, records: &[R]) -> Option<AggregateSnapshot> {
        let snapshot = AggregateSnapshot::from_records(records)?;
        self.positive_ratio.set(snapshot.positive_ratio);
        self.negative_ratio.set(snapshot.negative_ratio);
        self.avg_confidence.set(snapshot.avg_confidence);
        Some(snapshot)
    }

    /// Like [`compute`](Self::compute), and also sets throughput as records per
    /// minute over `window`.
    pub fn compute_over_window<R: LabeledPrediction>(
        &self,
        records: &[R],
        window: Duration,
    ) -> Option<AggregateSnapshot> {
        let snapshot = self.compute(records)?;
        let minutes = window.as_secs_f64() / 60.0;
        if minutes > 0.0 {
            self.throughput.set(snapshot.total as f64 / minutes);
        }
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Record(SentimentLabel, f64);

    impl LabeledPrediction for Record {
        fn label(&self) -> SentimentLabel {
            self.0
        }

        fn confidence(&self) -> f64 {
            self.1
        }
    }

    fn metrics() -> AggregateMetrics {
        AggregateMetrics::new().unwrap()
    }

    #[test]
    fn test_even_split() {
        let metrics = metrics();
        let records = [
            Record(SentimentLabel::Positive, 1.0),
            Record(SentimentLabel::Negative, 0.0),
        ];
        let snapshot = metrics.compute(&records).unwrap();

        assert_eq!(snapshot.total, 2);
        assert_eq!(metrics.positive_ratio.get(), 0.5);
        assert_eq!(metrics.negative_ratio.get(), 0.5);
        assert_eq!(metrics.avg_confidence.get(), 0.5);
    }

    #[test]
    fn test_empty_batch_keeps_previous_values() {
        let metrics = metrics();
        metrics.compute(&[Record(SentimentLabel::Positive, 0.9)]);
        metrics.throughput.set(3.0);

        assert!(metrics
            .compute_over_window::<Record>(&[], Duration::from_secs(3600))
            .is_none());
        assert_eq!(metrics.positive_ratio.get(), 1.0);
        assert_eq!(metrics.negative_ratio.get(), 0.0);
        assert_eq!(metrics.avg_confidence.get(), 0.9);
        assert_eq!(metrics.throughput.get(), 3.0);
    }

    #[test]
    fn test_throughput_per_minute() {
        let metrics = metrics();
        let records: Vec<_> = (0..120)
            .map(|i| {
                let label = if i % 3 == 0 {
                    SentimentLabel::Positive
                } else {
                    SentimentLabel::Negative
                };
                Record(label, 0.75)
            })
            .collect();

        metrics.compute_over_window(&records, Duration::from_secs(3600));
        assert_eq!(metrics.throughput.get(), 2.0);
        assert!((metrics.positive_ratio.get() - 1.0 / 3.0).abs() < 1e-12);
        assert!((metrics.negative_ratio.get() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_gauges_render_from_own_registry() {
        let metrics = metrics();
        metrics.compute(&[Record(SentimentLabel::Negative, 0.6)]);
        let text = metrics.registry().render();
        assert!(text.contains("sentiment_negative_ratio 1"));
        assert!(text.contains("sentiment_avg_confidence 0.6"));
        assert!(!text.contains("active_requests"));
    }

    #[test]
    fn test_error_records_count_towards_total_only() {
        let records = [
            Record(SentimentLabel::Positive, 0.8),
            Record(SentimentLabel::Error, 0.0),
        ];
        let snapshot = AggregateSnapshot::from_records(&records).unwrap();
        assert_eq!(snapshot.positive_ratio, 0.5);
        assert_eq!(snapshot.negative_ratio, 0.0);
        assert!((snapshot.avg_confidence - 0.4).abs() < 1e-12);
    }
}
