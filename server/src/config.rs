use crate::error::{Result, ServerError};
use inference::DeviceRequest;
use monitoring::DEFAULT_JOB;
use std::path::PathBuf;
use std::time::Duration;
use storage::DatabaseConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database: DatabaseConfig,
    pub model_path: PathBuf,
    pub vocab_path: PathBuf,
    pub host: String,
    pub webapp_port: u16,
    pub dbapp_port: u16,
    pub device: DeviceRequest,
    pub request_timeout: Duration,
    pub pushgateway_url: Option<String>,
    pub metrics_job: String,
    pub export_interval: Duration,
    pub metrics_window: Duration,
    pub debug: bool,
}

impl ServerConfig {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let model_path = get("MODEL_PATH")
            .map(PathBuf::from)
            .ok_or_else(|| ServerError::Config("MODEL_PATH must be set".to_string()))?;
        let vocab_path = get("VOCAB_PATH")
            .map(PathBuf::from)
            .ok_or_else(|| ServerError::Config("VOCAB_PATH must be set".to_string()))?;

        let database = DatabaseConfig::from_lookup(&lookup)?;

        let device = match get("DEVICE") {
            Some(raw) => raw.parse::<DeviceRequest>().map_err(ServerError::Config)?,
            None => DeviceRequest::Auto,
        };

        let config = Self {
            database,
            model_path,
            vocab_path,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            webapp_port: parse_or(&get, "WEBAPP_PORT", 5000)?,
            dbapp_port: parse_or(&get, "DBAPP_PORT", 5001)?,
            device,
            request_timeout: Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT_SECS", 30)?),
            pushgateway_url: get("PUSHGATEWAY_URL"),
            metrics_job: get("METRICS_JOB_NAME").unwrap_or_else(|| DEFAULT_JOB.to_string()),
            export_interval: Duration::from_secs(parse_or(
                &get,
                "METRICS_EXPORT_INTERVAL_SECS",
                60,
            )?),
            metrics_window: Duration::from_secs(parse_or(&get, "METRICS_WINDOW_SECS", 3600)?),
            debug: get("DEBUG").is_some_and(|v| is_truthy(&v)),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn webapp_address(&self) -> String {
        format!("{}:{}", self.host, self.webapp_port)
    }

    pub fn dbapp_address(&self) -> String {
        format!("{}:{}", self.host, self.dbapp_port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(ServerError::Config("Host cannot be empty".to_string()));
        }

        if self.webapp_port == self.dbapp_port && self.webapp_port != 0 {
            return Err(ServerError::Config(format!(
                "WEBAPP_PORT and DBAPP_PORT are both {}",
                self.webapp_port
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(ServerError::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        if self.export_interval.is_zero() || self.metrics_window.is_zero() {
            return Err(ServerError::Config(
                "Metrics export interval and window must be greater than zero".to_string(),
            ));
        }

        self.database.validate()?;
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ServerError::Config(format!("Invalid {key}: '{raw}'")))
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match get(key) {
        Some(raw) => parse_var(key, &raw),
        None => Ok(default),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
