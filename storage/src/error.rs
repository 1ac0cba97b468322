use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Prediction with request id '{request_id}' already stored")]
    DuplicateRequestId { request_id: String },

    #[error("Only successful predictions are stored (request {request_id})")]
    NotPersistable { request_id: String },

    #[error("Corrupt record {id}: {message}")]
    CorruptRecord { id: i64, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },
}

impl StorageError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    pub fn corrupt(id: i64, message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            id,
            message: message.into(),
        }
    }
}
