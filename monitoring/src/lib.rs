pub mod aggregate;
pub mod error;
pub mod instrument;
pub mod push;
pub mod registry;

pub use aggregate::{AggregateMetrics, AggregateSnapshot};
pub use error::{MetricsError, Result};
pub use instrument::{InstrumentedPredictor, PredictionMetrics};
pub use push::{PushGateway, DEFAULT_JOB};
pub use registry::{Counter, CounterVec, Gauge, GaugeVec, Histogram, MetricsRegistry};

/// Content type of the text exposition format.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
