use chrono::{DateTime, Utc};
use inference::SentimentLabel;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::time::Duration;
use tracing::{debug, info};

use crate::{
    config::{DatabaseConfig, DatabaseLocation},
    error::{Result, StorageError},
    query::{Page, Pagination, PredictionQuery},
    schema::{
        decode_timestamp, encode_timestamp, Averages, ConfidenceStats, LabelStats,
        NewPrediction, PredictionRecord, CREATE_TABLE_SQL,
    },
};

const SELECT_COLUMNS: &str =
    "id, text, prediction, confidence, sentiment_score, timestamp, request_id, processing_time";

/// Prediction records in a single SQLite database.
///
/// One connection behind a mutex; SQLite serializes writers anyway and every
/// statement here is short.
pub struct PredictionStore {
    conn: Mutex<Connection>,
    config: DatabaseConfig,
}

impl PredictionStore {
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let conn = match &config.location {
            DatabaseLocation::InMemory => Connection::open_in_memory()?,
            DatabaseLocation::File(path) => {
                info!("Opening prediction database at {}", path.display());
                let conn = Connection::open(path)?;
                conn.execute_batch("PRAGMA journal_mode=WAL;")?;
                conn
            }
        };
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        let store = Self {
            conn: Mutex::new(conn),
            config,
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(DatabaseConfig::in_memory())
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Creates the table and indexes when missing.
    pub fn initialize(&self) -> Result<()> {
        self.conn.lock().execute_batch(CREATE_TABLE_SQL)?;
        debug!("Prediction schema ready");
        Ok(())
    }

    pub fn insert(&self, prediction: &NewPrediction) -> Result<i64> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT INTO sentiment_predictions (
               text, prediction, confidence, sentiment_score, timestamp, request_id, processing_time
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                prediction.text,
                prediction.prediction.as_str(),
                prediction.confidence,
                prediction.sentiment_score,
                encode_timestamp(&prediction.timestamp),
                prediction.request_id,
                prediction.processing_time,
            ],
        );

        match inserted {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                debug!("Stored prediction {} as row {}", prediction.request_id, id);
                Ok(id)
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::DuplicateRequestId {
                    request_id: prediction.request_id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get(&self, id: i64) -> Result<Option<PredictionRecord>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM sentiment_predictions WHERE id = ?1"),
                params![id],
                RawRecord::from_row,
            )
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    pub fn get_by_request_id(&self, request_id: &str) -> Result<Option<PredictionRecord>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM sentiment_predictions WHERE request_id = ?1"),
                params![request_id],
                RawRecord::from_row,
            )
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    /// Newest first, optionally restricted to one label.
    pub fn list(&self, query: &PredictionQuery) -> Result<Page<PredictionRecord>> {
        query.validate()?;
        let limit = i64::from(query.per_page);
        let offset = i64::try_from(query.offset())
            .map_err(|_| StorageError::invalid_query("page out of range"))?;

        let conn = self.conn.lock();
        let (raws, total) = match &query.label {
            Some(label) => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {SELECT_COLUMNS} FROM sentiment_predictions
                     WHERE prediction = ?1
                     ORDER BY timestamp DESC, id DESC LIMIT ?2 OFFSET ?3"
                ))?;
                let raws = stmt
                    .query_map(params![label, limit, offset], RawRecord::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sentiment_predictions WHERE prediction = ?1",
                    params![label],
                    |row| row.get(0),
                )?;
                (raws, total)
            }
            None => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {SELECT_COLUMNS} FROM sentiment_predictions
                     ORDER BY timestamp DESC, id DESC LIMIT ?1 OFFSET ?2"
                ))?;
                let raws = stmt
                    .query_map(params![limit, offset], RawRecord::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                let total: i64 =
                    conn.query_row("SELECT COUNT(*) FROM sentiment_predictions", [], |row| {
                        row.get(0)
                    })?;
                (raws, total)
            }
        };

        let items = raws
            .into_iter()
            .map(RawRecord::into_record)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            pagination: Pagination::new(query.page, query.per_page, total.max(0) as u64),
        })
    }

    /// Records stored at or after `since`, newest first.
    pub fn since(&self, since: DateTime<Utc>) -> Result<Vec<PredictionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM sentiment_predictions
             WHERE timestamp >= ?1 ORDER BY timestamp DESC, id DESC"
        ))?;
        let raws = stmt
            .query_map(params![encode_timestamp(&since)], RawRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawRecord::into_record).collect()
    }

    pub fn recent(&self, window: Duration) -> Result<Vec<PredictionRecord>> {
        self.since(window_start(window)?)
    }

    pub fn count(&self) -> Result<u64> {
        let total: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM sentiment_predictions",
            [],
            |row| row.get(0),
        )?;
        Ok(total.max(0) as u64)
    }

    pub fn count_since(&self, since: DateTime<Utc>) -> Result<u64> {
        let total: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM sentiment_predictions WHERE timestamp >= ?1",
            params![encode_timestamp(&since)],
            |row| row.get(0),
        )?;
        Ok(total.max(0) as u64)
    }

    pub fn count_recent(&self, window: Duration) -> Result<u64> {
        self.count_since(window_start(window)?)
    }

    /// Count and averages per stored label.
    pub fn stats_by_label(&self) -> Result<Vec<LabelStats>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT prediction, COUNT(id), AVG(confidence), AVG(processing_time)
             FROM sentiment_predictions GROUP BY prediction ORDER BY prediction",
        )?;
        let stats = stmt
            .query_map([], |row| {
                Ok(LabelStats {
                    sentiment: row.get(0)?,
                    count: row.get::<_, i64>(1)?.max(0) as u64,
                    avg_confidence: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                    avg_processing_time: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stats)
    }

    /// Min, max and mean confidence over the whole table; zeros when empty.
    pub fn confidence_stats(&self) -> Result<ConfidenceStats> {
        let stats = self.conn.lock().query_row(
            "SELECT MIN(confidence), MAX(confidence), AVG(confidence) FROM sentiment_predictions",
            [],
            |row| {
                Ok(ConfidenceStats {
                    min: row.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
                    max: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                    average: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                })
            },
        )?;
        Ok(stats)
    }

    pub fn averages(&self) -> Result<Averages> {
        let averages = self.conn.lock().query_row(
            "SELECT AVG(confidence), AVG(processing_time) FROM sentiment_predictions",
            [],
            |row| {
                Ok(Averages {
                    confidence: row.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
                    processing_time: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                })
            },
        )?;
        Ok(averages)
    }
}

fn window_start(window: Duration) -> Result<DateTime<Utc>> {
    let window = chrono::Duration::from_std(window)
        .map_err(|_| StorageError::invalid_query("window too large"))?;
    Ok(Utc::now() - window)
}

/// Row as read from SQLite, before label and timestamp are parsed.
struct RawRecord {
    id: i64,
    text: String,
    prediction: String,
    confidence: f64,
    sentiment_score: f64,
    timestamp: String,
    request_id: String,
    processing_time: f64,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            text: row.get(1)?,
            prediction: row.get(2)?,
            confidence: row.get(3)?,
            sentiment_score: row.get(4)?,
            timestamp: row.get(5)?,
            request_id: row.get(6)?,
            processing_time: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<PredictionRecord> {
        let prediction = self
            .prediction
            .parse::<SentimentLabel>()
            .map_err(|e: String| StorageError::corrupt(self.id, e))?;
        let timestamp = decode_timestamp(&self.timestamp)
            .map_err(|e| StorageError::corrupt(self.id, format!("timestamp: {e}")))?;

        Ok(PredictionRecord {
            id: self.id,
            text: self.text,
            prediction,
            confidence: self.confidence,
            sentiment_score: self.sentiment_score,
            timestamp,
            request_id: self.request_id,
            processing_time: self.processing_time,
        })
    }
}
