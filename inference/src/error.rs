use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Model loading failed: {0}")]
    ModelLoad(#[from] LoadError),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Loaded artifact is not a model: {0}")]
    NotAModel(String),

    #[error("Tensor operation failed: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("Unexpected model output: {0}")]
    Output(String),

    #[error("Artifact serialization failed: {0}")]
    Artifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Startup failures raised while resolving model and vocabulary artifacts.
///
/// Everything except [`LoadError::ArchitectureNotFound`] is fatal: the
/// service must not start serving with a partially loaded model.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Model artifact not found: {path}")]
    ArtifactNotFound { path: String },

    #[error("Model artifact '{path}' is unreadable: {message}")]
    ArtifactFormat { path: String, message: String },

    // Adapters match on the class name in this message.
    #[error("Can't get attribute '{class}' on <module '{namespace}'>")]
    ArchitectureNotFound { namespace: String, class: String },

    #[error("Compute device '{requested}' is unavailable: {message}")]
    DeviceUnavailable { requested: String, message: String },

    #[error("Vocabulary artifact not found: {path}")]
    VocabularyNotFound { path: String },

    #[error("Vocabulary artifact '{path}' is unreadable: {message}")]
    VocabularyFormat { path: String, message: String },
}

impl LoadError {
    pub fn artifact_format(path: impl Into<String>, message: impl ToString) -> Self {
        Self::ArtifactFormat {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn vocabulary_format(path: impl Into<String>, message: impl ToString) -> Self {
        Self::VocabularyFormat {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Only the missing-architecture condition may be retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ArchitectureNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, InferenceError>;
