use inference::SentimentLabel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use storage::query::{DEFAULT_PER_PAGE, HISTORY_PER_PAGE};
use storage::{ConfidenceStats, LabelStats, Page, Pagination, PredictionQuery, PredictionRecord};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceIndex {
    pub message: String,
    pub endpoints: BTreeMap<String, String>,
}

impl ServiceIndex {
    pub fn new(message: &str, endpoints: &[(&str, &str)]) -> Self {
        Self {
            message: message.to_string(),
            endpoints: endpoints
                .iter()
                .map(|(path, about)| (path.to_string(), about.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    pub page: Option<u32>,
}

impl HistoryParams {
    pub fn to_query(&self) -> PredictionQuery {
        PredictionQuery::new()
            .with_page(self.page.unwrap_or(1))
            .with_per_page(HISTORY_PER_PAGE)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub sentiment: Option<String>,
}

impl ListParams {
    pub fn to_query(&self) -> PredictionQuery {
        let query = PredictionQuery::new()
            .with_page(self.page.unwrap_or(1))
            .with_per_page(self.per_page.unwrap_or(DEFAULT_PER_PAGE));
        // Known labels match in any case; anything else is kept as given.
        match self.sentiment.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => match label.parse::<SentimentLabel>() {
                Ok(known) => query.with_label(known.as_str()),
                Err(_) => query.with_label(label),
            },
            _ => query,
        }
    }
}

/// A page of records with their text shortened for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionList {
    pub predictions: Vec<PredictionRecord>,
    pub pagination: Pagination,
}

impl From<Page<PredictionRecord>> for PredictionList {
    fn from(page: Page<PredictionRecord>) -> Self {
        let page = page.map(|record| record.to_summary());
        Self {
            predictions: page.items,
            pagination: page.pagination,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub total_predictions: u64,
    pub recent_predictions: u64,
    pub sentiment_distribution: BTreeMap<String, u64>,
    pub avg_confidence: f64,
    pub avg_processing_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_predictions: u64,
    pub recent_activity_last_hour: u64,
    pub sentiment_distribution: Vec<LabelStats>,
    pub confidence_stats: ConfidenceStats,
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.87654, 3), 0.877);
        assert_eq!(round_to(0.00123456, 4), 0.0012);
        assert_eq!(round_to(0.0, 3), 0.0);
    }

    #[test]
    fn test_list_params_defaults_and_blank_filter() {
        let query = ListParams::default().to_query();
        assert_eq!((query.page, query.per_page), (1, 50));
        assert!(query.label.is_none());

        let query = ListParams {
            sentiment: Some("  ".into()),
            ..Default::default()
        }
        .to_query();
        assert!(query.label.is_none());

        for raw in ["positive", "POSITIVE", " Positive "] {
            let query = ListParams {
                sentiment: Some(raw.into()),
                ..Default::default()
            }
            .to_query();
            assert_eq!(query.label.as_deref(), Some("Positive"), "{raw}");
        }

        let query = ListParams {
            sentiment: Some("Neutral".into()),
            ..Default::default()
        }
        .to_query();
        assert_eq!(query.label.as_deref(), Some("Neutral"));

        let query = HistoryParams { page: Some(3) }.to_query();
        assert_eq!((query.page, query.per_page), (3, 20));
    }

    #[test]
    fn test_missing_text_deserializes_empty() {
        let request: PredictRequest = serde_json::from_str("{}").unwrap();
        assert!(request.text.is_empty());
    }
}
