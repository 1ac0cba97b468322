use crate::encoder::{EncodedInput, SequenceEncoder};
use crate::loader::{Artifact, DeviceRequest, LoadedModel, ModelLoader};
use crate::tokenizer::Tokenizer;
use crate::{InferenceError, PredictionResult, Result, SentimentLabel};
use candle_core::{DType, Device};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Anything that turns text into a [`PredictionResult`]. Implementations never
/// fail outright: errors are reported through a result with `success == false`.
pub trait Predict: Send + Sync {
    fn predict(&self, text: &str) -> PredictionResult;

    fn predict_batch(&self, texts: &[&str]) -> Vec<PredictionResult> {
        texts.iter().map(|text| self.predict(text)).collect()
    }
}

impl<P: Predict + ?Sized> Predict for Box<P> {
    fn predict(&self, text: &str) -> PredictionResult {
        (**self).predict(text)
    }
}

impl<P: Predict + ?Sized> Predict for Arc<P> {
    fn predict(&self, text: &str) -> PredictionResult {
        (**self).predict(text)
    }
}

/// Label, confidence and score derived from the two output logits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentScores {
    pub label: SentimentLabel,
    pub confidence: f64,
    pub sentiment_score: f64,
}

impl SentimentScores {
    /// Positive only on a strict win; ties go to Negative.
    pub fn from_logits(negative: f64, positive: f64) -> Result<Self> {
        if !negative.is_finite() || !positive.is_finite() {
            return Err(InferenceError::Output(format!(
                "non-finite logits [{negative}, {positive}]"
            )));
        }

        let (label, winner) = if positive > negative {
            (SentimentLabel::Positive, positive)
        } else {
            (SentimentLabel::Negative, negative)
        };

        let max = negative.max(positive);
        let denom = (negative - max).exp() + (positive - max).exp();
        let confidence = (winner - max).exp() / denom;

        Ok(Self {
            label,
            confidence,
            sentiment_score: positive - negative,
        })
    }
}

pub struct SentimentPredictor {
    artifact: Artifact,
    tokenizer: Tokenizer,
    encoder: SequenceEncoder,
    device: Device,
}

impl SentimentPredictor {
    pub fn new(model_path: &Path, vocab_path: &Path, device: DeviceRequest) -> Result<Self> {
        tracing::info!("Initializing sentiment predictor from: {:?}", model_path);
        let loaded = ModelLoader::new(device).load(model_path, vocab_path)?;
        let predictor = Self::from_loaded(loaded)?;
        tracing::info!("Successfully initialized sentiment predictor");
        Ok(predictor)
    }

    pub fn from_loaded(loaded: LoadedModel) -> Result<Self> {
        Ok(Self {
            artifact: loaded.artifact,
            tokenizer: Tokenizer::new(loaded.vocabulary)?,
            encoder: SequenceEncoder::default(),
            device: loaded.device,
        })
    }

    pub fn with_encoder(mut self, encoder: SequenceEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn encode(&self, text: &str) -> EncodedInput {
        self.encoder.encode(&self.tokenizer.tokenize_and_map(text))
    }

    /// Raw `[negative, positive]` logits for `text`.
    pub fn logits(&self, text: &str) -> Result<[f64; 2]> {
        let network = self.artifact.as_network().ok_or_else(|| {
            InferenceError::NotAModel(format!(
                "{:?} has no forward pass; load a saved module instead",
                self.artifact
            ))
        })?;

        let input = self.encode(text).to_tensor(network.device())?;
        let output = network.forward(&input)?;
        let values = output.squeeze(0)?.to_dtype(DType::F64)?.to_vec1::<f64>()?;

        match values.as_slice() {
            [negative, positive] => Ok([*negative, *positive]),
            other => Err(InferenceError::Output(format!(
                "expected 2 logits, got {}",
                other.len()
            ))),
        }
    }

    fn score(&self, text: &str) -> Result<SentimentScores> {
        let [negative, positive] = self.logits(text)?;
        SentimentScores::from_logits(negative, positive)
    }
}

impl Predict for SentimentPredictor {
    fn predict(&self, text: &str) -> PredictionResult {
        let request_id = Uuid::new_v4().to_string();
        let start = Instant::now();
        let outcome = self.score(text);
        let processing_time = start.elapsed().as_secs_f64();

        match outcome {
            Ok(scores) => {
                tracing::debug!(
                    "Sentiment for '{}': {} (score: {:.3}, confidence: {:.3})",
                    text.chars().take(50).collect::<String>(),
                    scores.label,
                    scores.sentiment_score,
                    scores.confidence
                );
                PredictionResult::success(request_id, text, scores, processing_time)
            }
            Err(e) => {
                tracing::error!("Prediction {} failed: {}", request_id, e);
                PredictionResult::failure(request_id, text, e.to_string(), processing_time)
            }
        }
    }
}
