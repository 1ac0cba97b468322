pub mod encoder;
pub mod error;
pub mod inference;
pub mod loader;
pub mod model;
pub mod tokenizer;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use encoder::{EncodedInput, SequenceEncoder, EOS_ID, MAX_SEQ_LEN, PAD_ID};
pub use error::{InferenceError, LoadError, Result};
pub use inference::{Predict, SentimentPredictor, SentimentScores};
pub use loader::{
    ArchitectureRegistry, Artifact, ArtifactAdapter, ArtifactKind, DeviceRequest, LoadedModel,
    MissingArchitectureAdapter, ModelLoader,
};
pub use model::{SentiNN, SentimentNetwork};
pub use tokenizer::{Tokenizer, Vocabulary};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Error,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "Positive",
            SentimentLabel::Negative => "Negative",
            SentimentLabel::Error => "Error",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "positive" => Ok(SentimentLabel::Positive),
            "negative" => Ok(SentimentLabel::Negative),
            "error" => Ok(SentimentLabel::Error),
            _ => Err(format!("unknown sentiment label '{s}'")),
        }
    }
}

/// Outcome of a single prediction request. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub request_id: String,
    pub text: String,
    #[serde(rename = "prediction")]
    pub label: SentimentLabel,
    pub confidence: f64,    // softmax probability of the chosen class, 0.0 to 1.0
    pub sentiment_score: f64, // positive logit minus negative logit, unbounded
    pub processing_time: f64, // seconds
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionResult {
    pub fn success(
        request_id: String,
        text: &str,
        scores: SentimentScores,
        processing_time: f64,
    ) -> Self {
        Self {
            request_id,
            text: text.to_string(),
            label: scores.label,
            confidence: scores.confidence,
            sentiment_score: scores.sentiment_score,
            processing_time,
            success: true,
            error: None,
        }
    }

    pub fn failure(request_id: String, text: &str, error: String, processing_time: f64) -> Self {
        Self {
            request_id,
            text: text.to_string(),
            label: SentimentLabel::Error,
            confidence: 0.0,
            sentiment_score: 0.0,
            processing_time,
            success: false,
            error: Some(error),
        }
    }
}

/// Minimal view of a prediction needed for aggregate statistics.
pub trait LabeledPrediction {
    fn label(&self) -> SentimentLabel;
    fn confidence(&self) -> f64;
}

impl LabeledPrediction for PredictionResult {
    fn label(&self) -> SentimentLabel {
        self.label
    }

    fn confidence(&self) -> f64 {
        self.confidence
    }
}

impl<T: LabeledPrediction + ?Sized> LabeledPrediction for &T {
    fn label(&self) -> SentimentLabel {
        (**self).label()
    }

    fn confidence(&self) -> f64 {
        (**self).confidence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_round_trips_through_str() {
        for label in [
            SentimentLabel::Positive,
            SentimentLabel::Negative,
            SentimentLabel::Error,
        ] {
            assert_eq!(label.as_str().parse::<SentimentLabel>().unwrap(), label);
        }
        assert_eq!("POSITIVE".parse::<SentimentLabel>().unwrap(), SentimentLabel::Positive);
        assert!("neutral".parse::<SentimentLabel>().is_err());
    }

    #[test]
    fn test_failure_result_serializes_error_fields() {
        let result = PredictionResult::failure("id-1".into(), "text", "boom".into(), 0.01);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["prediction"], "Error");
        assert_eq!(json["confidence"], 0.0);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn test_success_result_omits_error() {
        let scores = SentimentScores::from_logits(0.0, 1.0).unwrap();
        let result = PredictionResult::success("id-2".into(), "nice", scores, 0.002);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["prediction"], "Positive");
        assert!(json.get("error").is_none());
    }
}
