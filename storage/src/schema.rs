use chrono::{DateTime, SecondsFormat, Utc};
use inference::{LabeledPrediction, PredictionResult, SentimentLabel};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

pub const TABLE_NAME: &str = "sentiment_predictions";
pub const SUMMARY_TEXT_LEN: usize = 100;

pub const CREATE_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS sentiment_predictions (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      text TEXT NOT NULL,
      prediction VARCHAR(50) NOT NULL,
      confidence REAL NOT NULL,
      sentiment_score REAL NOT NULL,
      timestamp TEXT NOT NULL,
      request_id VARCHAR(100) NOT NULL UNIQUE,
      processing_time REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sentiment_predictions_timestamp
      ON sentiment_predictions (timestamp);
    CREATE INDEX IF NOT EXISTS idx_sentiment_predictions_prediction
      ON sentiment_predictions (prediction);
";

/// Fixed-width UTC encoding so that text ordering matches time ordering.
pub fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc))
}

/// First `max_chars` characters followed by `...` when the text is longer.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// A stored prediction row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: i64,
    pub text: String,
    pub prediction: SentimentLabel,
    pub confidence: f64,
    pub sentiment_score: f64,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub processing_time: f64,
}

impl PredictionRecord {
    /// Listing view with the text shortened to [`SUMMARY_TEXT_LEN`] characters.
    pub fn to_summary(&self) -> PredictionRecord {
        PredictionRecord {
            text: truncate_text(&self.text, SUMMARY_TEXT_LEN),
            ..self.clone()
        }
    }
}

impl LabeledPrediction for PredictionRecord {
    fn label(&self) -> SentimentLabel {
        self.prediction
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }
}

/// A successful prediction ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    pub text: String,
    pub prediction: SentimentLabel,
    pub confidence: f64,
    pub sentiment_score: f64,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub processing_time: f64,
}

impl NewPrediction {
    pub fn from_result(result: &PredictionResult) -> Result<Self> {
        if !result.success || result.label == SentimentLabel::Error {
            return Err(StorageError::NotPersistable {
                request_id: result.request_id.clone(),
            });
        }

        Ok(Self {
            text: result.text.clone(),
            prediction: result.label,
            confidence: result.confidence,
            sentiment_score: result.sentiment_score,
            timestamp: Utc::now(),
            request_id: result.request_id.clone(),
            processing_time: result.processing_time,
        })
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl TryFrom<&PredictionResult> for NewPrediction {
    type Error = StorageError;

    fn try_from(result: &PredictionResult) -> Result<Self> {
        Self::from_result(result)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelStats {
    pub sentiment: String,
    pub count: u64,
    pub avg_confidence: f64,
    pub avg_processing_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceStats {
    pub min: f64,
    pub max: f64,
    pub average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Averages {
    pub confidence: f64,
    pub processing_time: f64,
}
