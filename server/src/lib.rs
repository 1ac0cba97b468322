// Sentiment prediction service: HTTP APIs, configuration and metrics export

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod error;
pub mod exporter;
pub mod models;
pub mod server;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use exporter::MetricsExporter;
pub use server::{prediction_router, records_router, serve, AppState};

use inference::{ModelLoader, SentimentPredictor};

/// Loads the model and vocabulary named by `config`. Any failure here is fatal.
pub fn load_predictor(config: &ServerConfig) -> Result<SentimentPredictor> {
    tracing::info!(
        "Loading model from {} (vocabulary {}, device {})",
        config.model_path.display(),
        config.vocab_path.display(),
        config.device
    );
    let loaded = ModelLoader::new(config.device).load(&config.model_path, &config.vocab_path)?;
    if let Some(adapter) = &loaded.recovered_by {
        tracing::warn!(
            "Model loaded after {} attempts using the {} adapter",
            loaded.attempts,
            adapter
        );
    }
    Ok(SentimentPredictor::from_loaded(loaded)?)
}
