//! Small, hand-weighted model and vocabulary for tests.
//!
//! The network remembers the polarity of the last sentiment-bearing word it
//! saw: each such word overwrites the GRU state, every other token leaves it
//! alone. Words in [`POSITIVE_WORDS`] therefore push the final logits towards
//! Positive, words in [`NEGATIVE_WORDS`] towards Negative, and text without
//! either produces equal logits.

use crate::loader::{save_artifact, ArtifactKind, DeviceRequest, ModelLoader};
use crate::tokenizer::{Vocabulary, VocabularyFile, EOS_TOKEN, PAD_TOKEN, UNK_TOKEN};
use crate::{Result, SentimentPredictor};
use candle_core::{Device, Tensor};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const RESOLVABLE_ARCHITECTURE: &str = "ml_model.model_architecture.SentiNN";
pub const MAIN_ARCHITECTURE: &str = "__main__.SentiNN";

pub const POSITIVE_WORDS: &[&str] = &["love", "amazing", "great", "good", "excellent", "like"];
pub const NEGATIVE_WORDS: &[&str] = &["terrible", "awful", "bad", "horrible", "hate", "worst"];
const NEUTRAL_WORDS: &[&str] = &[
    "i", "this", "product", "!", "it", "'", "s", "is", "and", "the", "a", ".", ",", "?", "movie",
    "was", "not",
];

const EMBED: usize = 2;
const HIDDEN: usize = 2;

pub fn fixture_tokens() -> Vec<String> {
    [UNK_TOKEN, EOS_TOKEN, PAD_TOKEN]
        .iter()
        .chain(POSITIVE_WORDS)
        .chain(NEGATIVE_WORDS)
        .chain(NEUTRAL_WORDS)
        .map(|s| s.to_string())
        .collect()
}

pub fn fixture_vocabulary() -> Result<Vocabulary> {
    Ok(Vocabulary::from_tokens(fixture_tokens())?)
}

fn matrix(rows: usize, cols: usize, data: Vec<f32>) -> Result<Tensor> {
    Ok(Tensor::from_vec(data, (rows, cols), &Device::Cpu)?)
}

fn vector(data: Vec<f32>) -> Result<Tensor> {
    let len = data.len();
    Ok(Tensor::from_vec(data, len, &Device::Cpu)?)
}

pub fn fixture_parameters() -> Result<HashMap<String, Tensor>> {
    let tokens = fixture_tokens();
    let mut embedding = Vec::with_capacity(tokens.len() * EMBED);
    for token in &tokens {
        let row = if POSITIVE_WORDS.contains(&token.as_str()) {
            [1.0, 0.0]
        } else if NEGATIVE_WORDS.contains(&token.as_str()) {
            [0.0, 1.0]
        } else {
            [0.0, 0.0]
        };
        embedding.extend_from_slice(&row);
    }

    // Gate rows are ordered reset, update, new.
    let weight_ih = vec![
        0.0, 0.0, 0.0, 0.0, // reset
        -20.0, -20.0, -20.0, -20.0, // update
        3.0, 0.0, 0.0, 3.0, // new
    ];
    let bias_ih = vec![10.0, 10.0, 10.0, 10.0, 0.0, 0.0];

    let mut parameters = HashMap::new();
    parameters.insert("e.weight".to_string(), matrix(tokens.len(), EMBED, embedding)?);
    parameters.insert("rnn.weight_ih_l0".to_string(), matrix(3 * HIDDEN, EMBED, weight_ih)?);
    parameters.insert(
        "rnn.weight_hh_l0".to_string(),
        matrix(3 * HIDDEN, HIDDEN, vec![0.0; 3 * HIDDEN * HIDDEN])?,
    );
    parameters.insert("rnn.bias_ih_l0".to_string(), vector(bias_ih)?);
    parameters.insert("rnn.bias_hh_l0".to_string(), vector(vec![0.0; 3 * HIDDEN])?);
    parameters.insert(
        "out.weight".to_string(),
        matrix(2, HIDDEN, vec![0.0, 4.0, 4.0, 0.0])?,
    );
    parameters.insert("out.bias".to_string(), vector(vec![0.0, 0.0])?);
    Ok(parameters)
}

/// Model and vocabulary artifacts written to a temporary directory.
pub struct Fixture {
    dir: TempDir,
    pub model_path: PathBuf,
    pub vocab_path: PathBuf,
}

impl Fixture {
    pub fn new(kind: ArtifactKind, architecture: Option<&str>) -> Result<Self> {
        let dir = TempDir::new()?;
        let model_path = dir.path().join("model.safetensors");
        let vocab_path = dir.path().join("vocab.json");

        save_artifact(&model_path, kind, architecture, &fixture_parameters()?)?;
        write_vocabulary(&vocab_path, &fixture_vocabulary()?.to_file())?;

        Ok(Self {
            dir,
            model_path,
            vocab_path,
        })
    }

    /// Module saved under the architecture's home namespace.
    pub fn module() -> Result<Self> {
        Self::new(ArtifactKind::Module, Some(RESOLVABLE_ARCHITECTURE))
    }

    /// Module saved from a training script, recorded under `__main__`.
    pub fn main_module() -> Result<Self> {
        Self::new(ArtifactKind::Module, Some(MAIN_ARCHITECTURE))
    }

    pub fn state_dict() -> Result<Self> {
        Self::new(ArtifactKind::StateDict, None)
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn loader(&self) -> ModelLoader {
        ModelLoader::new(DeviceRequest::Cpu)
    }

    pub fn predictor(&self) -> Result<SentimentPredictor> {
        SentimentPredictor::new(&self.model_path, &self.vocab_path, DeviceRequest::Cpu)
    }
}

pub fn write_vocabulary(path: &Path, file: &VocabularyFile) -> Result<()> {
    std::fs::write(path, serde_json::to_string(file)?)?;
    Ok(())
}
