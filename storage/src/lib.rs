pub mod schema;
pub mod storage;
pub mod query;
pub mod error;
pub mod config;

pub use error::{StorageError, Result};
pub use schema::{PredictionRecord, NewPrediction, LabelStats, ConfidenceStats, Averages};
pub use storage::PredictionStore;
pub use query::{PredictionQuery, Page, Pagination};
pub use config::{DatabaseConfig, DatabaseLocation};

// Re-export common types
pub use chrono::{DateTime, Utc};
