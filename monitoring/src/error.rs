use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Metric '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("Invalid metric name: '{0}'")]
    InvalidName(String),

    #[error("Histogram '{0}' needs strictly increasing bucket bounds")]
    InvalidBuckets(String),

    #[error("Push to gateway failed: {0}")]
    Push(#[from] reqwest::Error),

    #[error("Gateway rejected push with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, MetricsError>;
