use anyhow::{Context, Result};
use clap::Parser;
use inference::Predict;
use sentiment_server::{load_predictor, AppState, MetricsExporter, ServerConfig, VERSION};
use std::path::PathBuf;
use storage::PredictionStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Environment file loaded before reading configuration
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Classify one text, print the result as JSON and exit
    #[arg(long)]
    predict: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if let Some(path) = &args.env_file {
        dotenvy::from_path(path)
            .with_context(|| format!("Failed to load env file {}", path.display()))?;
    }

    let config = ServerConfig::from_env()?;

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting sentiment-server v{}", VERSION);

    let loader_config = config.clone();
    let predictor = tokio::task::spawn_blocking(move || load_predictor(&loader_config))
        .await?
        .context("Failed to load sentiment model")?;

    if let Some(text) = args.predict {
        let result = predictor.predict(&text);
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let store = PredictionStore::open(config.database.clone())
        .context("Failed to open prediction database")?;
    let state = AppState::new(predictor, store, config.request_timeout)?;

    let exporter = MetricsExporter::from_config(&state, &config)?;
    let exporter_task = tokio::spawn(exporter.run());

    let served = sentiment_server::serve(state, &config).await;
    exporter_task.abort();
    served?;

    info!("sentiment-server stopped");
    Ok(())
}
