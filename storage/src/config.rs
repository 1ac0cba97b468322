use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::error::{Result, StorageError};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:///sentiment_predictions.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseLocation {
    File(PathBuf),
    InMemory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub location: DatabaseLocation,
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    /// Reads `DATABASE_URL` and `DATABASE_BUSY_TIMEOUT_MS` through `lookup`.
    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let url = get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let mut config = Self::from_url(&url)?;

        if let Some(timeout) = get("DATABASE_BUSY_TIMEOUT_MS") {
            config.busy_timeout_ms = timeout.trim().parse().map_err(|_| {
                StorageError::invalid_config(format!("Invalid DATABASE_BUSY_TIMEOUT_MS: '{timeout}'"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Accepts `sqlite:///relative.db`, `sqlite:////abs/path.db`, `sqlite://:memory:`,
    /// a bare path or `:memory:`.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = url.trim();
        let rest = match url.split_once("://") {
            Some(("sqlite", rest)) => rest.strip_prefix('/').unwrap_or(rest),
            Some((scheme, _)) => {
                return Err(StorageError::invalid_config(format!(
                    "Unsupported database scheme '{scheme}' (only sqlite is supported)"
                )))
            }
            None => url,
        };

        let location = match rest {
            "" => return Err(StorageError::invalid_config("Database path cannot be empty")),
            ":memory:" => DatabaseLocation::InMemory,
            path => DatabaseLocation::File(PathBuf::from(path)),
        };

        Ok(Self {
            location,
            busy_timeout_ms: 5_000,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            location: DatabaseLocation::InMemory,
            busy_timeout_ms: 5_000,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: DatabaseLocation::File(path.into()),
            busy_timeout_ms: 5_000,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let DatabaseLocation::File(path) = &self.location {
            if path.as_os_str().is_empty() {
                return Err(StorageError::invalid_config("Database path cannot be empty"));
            }
            if path.is_dir() {
                return Err(StorageError::invalid_config(format!(
                    "Database path {} is a directory",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::file("sentiment_predictions.db")
    }
}
