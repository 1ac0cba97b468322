use crate::config::ServerConfig;
use crate::server::AppState;
use crate::Result;
use monitoring::{AggregateMetrics, AggregateSnapshot, PushGateway};
use std::sync::Arc;
use std::time::Duration;
use storage::PredictionStore;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Periodically recomputes aggregate gauges from recent records and pushes
/// them to a gateway when one is configured.
pub struct MetricsExporter {
    store: Arc<PredictionStore>,
    aggregates: Arc<AggregateMetrics>,
    gateway: Option<PushGateway>,
    interval: Duration,
    window: Duration,
}

impl MetricsExporter {
    pub fn new(state: &AppState, interval: Duration, window: Duration) -> Self {
        Self {
            store: Arc::clone(&state.store),
            aggregates: Arc::clone(&state.aggregates),
            gateway: None,
            interval,
            window,
        }
    }

    pub fn from_config(state: &AppState, config: &ServerConfig) -> Result<Self> {
        let exporter = Self::new(state, config.export_interval, config.metrics_window);
        match &config.pushgateway_url {
            Some(url) => {
                let gateway = PushGateway::new(url.as_str(), config.metrics_job.as_str())?;
                Ok(exporter.with_gateway(gateway))
            }
            None => Ok(exporter),
        }
    }

    pub fn with_gateway(mut self, gateway: PushGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// One export cycle. Returns `None` when the window held no records, in
    /// which case nothing is pushed.
    pub async fn export_once(&self) -> Result<Option<AggregateSnapshot>> {
        let store = Arc::clone(&self.store);
        let window = self.window;
        let records = tokio::task::spawn_blocking(move || store.recent(window)).await??;

        let snapshot = self.aggregates.compute_over_window(&records, self.window);
        match &snapshot {
            Some(s) => debug!(
                "Aggregated {} predictions: positive {:.3}, negative {:.3}, confidence {:.3}",
                s.total, s.positive_ratio, s.negative_ratio, s.avg_confidence
            ),
            None => debug!("No predictions in the last {}s", self.window.as_secs()),
        }

        match (&self.gateway, &snapshot) {
            (Some(gateway), Some(_)) => self.aggregates.push(gateway).await?,
            (Some(_), None) => debug!("Skipping push, nothing to report"),
            (None, _) => {}
        }
        Ok(snapshot)
    }

    /// Runs forever; failed cycles are logged and retried on the next tick.
    pub async fn run(self) {
        info!(
            "Exporting aggregate metrics every {}s{}",
            self.interval.as_secs(),
            match &self.gateway {
                Some(gateway) => format!(" to {}", gateway.endpoint()),
                None => String::new(),
            }
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.export_once().await {
                warn!("Metrics export failed: {}", e);
            }
        }
    }
}
