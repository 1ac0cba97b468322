use crate::registry::MetricsRegistry;
use crate::{MetricsError, Result, TEXT_CONTENT_TYPE};
use std::time::Duration;

pub const DEFAULT_JOB: &str = "sentiment_metrics";

/// Client for a Prometheus push gateway.
#[derive(Debug, Clone)]
pub struct PushGateway {
    client: reqwest::Client,
    base_url: String,
    job: String,
}

impl PushGateway {
    pub fn new(base_url: impl Into<String>, job: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            job: job.into(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/metrics/job/{}", self.base_url, self.job)
    }

    /// Replaces every metric previously pushed under this job.
    pub async fn push(&self, registry: &MetricsRegistry) -> Result<()> {
        let body = registry.render();
        let response = self
            .client
            .put(self.endpoint())
            .header(reqwest::header::CONTENT_TYPE, TEXT_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MetricsError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!("Pushed {} metric families to {}", registry.len(), self.endpoint());
        Ok(())
    }
}
