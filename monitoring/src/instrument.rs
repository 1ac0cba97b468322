use crate::registry::{Counter, CounterVec, Gauge, GaugeVec, Histogram, MetricsRegistry, DEFAULT_BUCKETS};
use crate::Result;
use inference::{Predict, PredictionResult};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Per-request metric handles.
#[derive(Debug)]
pub struct PredictionMetrics {
    pub predictions: Arc<CounterVec<2>>,
    pub duration: Arc<Histogram>,
    pub confidence: Arc<GaugeVec<1>>,
    pub sentiment_score: Arc<Gauge>,
    pub active_requests: Arc<Gauge>,
    pub errors: Arc<Counter>,
}

impl PredictionMetrics {
    pub fn register(registry: &MetricsRegistry) -> Result<Self> {
        Ok(Self {
            predictions: registry.counter_vec(
                "sentiment_predictions_total",
                "Total sentiment predictions",
                ["sentiment", "status"],
            )?,
            duration: registry.histogram(
                "sentiment_prediction_duration_seconds",
                "Prediction processing time",
                &DEFAULT_BUCKETS,
            )?,
            confidence: registry.gauge_vec(
                "sentiment_confidence",
                "Prediction confidence",
                ["sentiment"],
            )?,
            sentiment_score: registry
                .gauge("sentiment_score_current", "Current sentiment score")?,
            active_requests: registry.gauge("active_requests", "Active prediction requests")?,
            errors: registry.counter("prediction_errors_total", "Total prediction errors")?,
        })
    }

    fn observe(&self, result: &PredictionResult, elapsed_secs: f64) {
        self.duration.observe(elapsed_secs);

        if result.success {
            let label = result.label.as_str();
            self.predictions.with_label_values([label, "success"]).inc();
            self.confidence.with_label_values([label]).set(result.confidence);
            self.sentiment_score.set(result.sentiment_score);
        } else {
            self.predictions.with_label_values(["error", "error"]).inc();
            self.errors.inc();
        }
    }
}

/// Holds the in-flight gauge up for as long as it lives.
struct InFlight<'a>(&'a Gauge);

impl<'a> InFlight<'a> {
    fn enter(gauge: &'a Gauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.dec();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Wraps a predictor with request metrics. Results pass through untouched.
pub struct InstrumentedPredictor<P> {
    inner: P,
    metrics: Arc<PredictionMetrics>,
}

impl<P: Predict> InstrumentedPredictor<P> {
    pub fn new(inner: P, metrics: Arc<PredictionMetrics>) -> Self {
        Self { inner, metrics }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn metrics(&self) -> &Arc<PredictionMetrics> {
        &self.metrics
    }
}

impl<P: Predict> Predict for InstrumentedPredictor<P> {
    fn predict(&self, text: &str) -> PredictionResult {
        let _in_flight = InFlight::enter(&self.metrics.active_requests);
        let start = Instant::now();

        let result = catch_unwind(AssertUnwindSafe(|| self.inner.predict(text))).unwrap_or_else(
            |payload| {
                let message = panic_message(&*payload);
                tracing::error!("Predictor panicked: {}", message);
                PredictionResult::failure(
                    Uuid::new_v4().to_string(),
                    text,
                    format!("predictor panicked: {message}"),
                    start.elapsed().as_secs_f64(),
                )
            },
        );

        self.metrics.observe(&result, start.elapsed().as_secs_f64());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference::{SentimentLabel, SentimentScores};

    struct Fixed(f64, f64);

    impl Predict for Fixed {
        fn predict(&self, text: &str) -> PredictionResult {
            let scores = SentimentScores::from_logits(self.0, self.1).unwrap();
            PredictionResult::success("fixed".into(), text, scores, 0.0)
        }
    }

    struct Failing;

    impl Predict for Failing {
        fn predict(&self, text: &str) -> PredictionResult {
            PredictionResult::failure("failing".into(), text, "broken".into(), 0.0)
        }
    }

    #[test]
    fn test_success_updates_labeled_metrics() {
        let registry = MetricsRegistry::new();
        let metrics = Arc::new(PredictionMetrics::register(&registry).unwrap());
        let predictor = InstrumentedPredictor::new(Fixed(0.0, 2.0), metrics.clone());

        let result = predictor.predict("fine");
        assert_eq!(result.label, SentimentLabel::Positive);
        assert_eq!(result.request_id, "fixed");

        let counter = metrics.predictions.get(["Positive", "success"]).unwrap();
        assert_eq!(counter.get(), 1);
        let confidence = metrics.confidence.get(["Positive"]).unwrap();
        assert_eq!(confidence.get(), result.confidence);
        assert_eq!(metrics.sentiment_score.get(), 2.0);
        assert_eq!(metrics.duration.count(), 1);
        assert_eq!(metrics.errors.get(), 0);
        assert_eq!(metrics.active_requests.get(), 0.0);
    }

    #[test]
    fn test_failure_updates_error_metrics() {
        let registry = MetricsRegistry::new();
        let metrics = Arc::new(PredictionMetrics::register(&registry).unwrap());
        let predictor = InstrumentedPredictor::new(Failing, metrics.clone());

        let result = predictor.predict("whatever");
        assert!(!result.success);
        assert_eq!(metrics.predictions.get(["error", "error"]).unwrap().get(), 1);
        assert_eq!(metrics.errors.get(), 1);
        assert!(metrics.confidence.get(["Error"]).is_none());
        assert_eq!(metrics.duration.count(), 1);
    }

    #[test]
    fn test_registering_twice_fails() {
        let registry = MetricsRegistry::new();
        PredictionMetrics::register(&registry).unwrap();
        assert!(PredictionMetrics::register(&registry).is_err());
    }
}
