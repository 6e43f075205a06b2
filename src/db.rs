use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::Row;

use crate::item_model::{NormalizedRecord, ParsedItem};
use crate::pipeline_errors::PipelineError;

/// A stored rescue log
#[derive(Debug, Clone, PartialEq)]
pub struct RescueLog {
    pub id: i64,
    pub location: String,
    pub drop_off_location: String,
    /// "inbound", "outbound", "both" or "unknown"
    pub direction: String,
    pub rescued_at: DateTime<Utc>,
    pub items: Vec<ParsedItem>,
    pub total_estimated_lbs: f64,
    pub raw_text: String,
    pub notes: Option<String>,
    /// Slack message timestamp the log was built from, used to skip replays
    pub source_ts: Option<String>,
    pub channel: Option<String>,
    pub user_id: Option<String>,
}

/// Where a record came from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordMeta {
    pub source_ts: Option<String>,
    pub channel: Option<String>,
    pub user_id: Option<String>,
    pub rescued_at: Option<DateTime<Utc>>,
}

/// Persistence collaborator used by the pipeline
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store a record and return its identifier
    async fn save(&self, record: &NormalizedRecord, meta: &RecordMeta) -> Result<String, PipelineError>;

    /// Whether a message with this timestamp has already been stored
    async fn is_processed(&self, source_ts: &str) -> Result<bool, PipelineError>;
}

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS rescue_logs (
            id BIGSERIAL PRIMARY KEY,
            location TEXT NOT NULL DEFAULT '',
            drop_off_location TEXT NOT NULL DEFAULT '',
            rescued_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            items JSONB NOT NULL DEFAULT '[]'::jsonb,
            total_estimated_lbs DOUBLE PRECISION NOT NULL DEFAULT 0,
            raw_text TEXT NOT NULL,
            notes TEXT,
            source_ts TEXT UNIQUE,
            channel TEXT,
            user_id TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create rescue_logs table")?;

    sqlx::query("ALTER TABLE rescue_logs ADD COLUMN IF NOT EXISTS direction TEXT NOT NULL DEFAULT 'unknown'")
        .execute(pool)
        .await
        .context("Failed to add direction column")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS rescue_logs_location_idx ON rescue_logs (location, rescued_at)")
        .execute(pool)
        .await
        .context("Failed to create location index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

fn record_notes(record: &NormalizedRecord) -> Option<String> {
    let mut notes = Vec::new();
    if let Some(error) = &record.oracle_error {
        notes.push(format!("oracle: {error}"));
    }
    notes.extend(record.image_errors.iter().map(|e| format!("image: {e}")));
    if !record.unparsed_lines.is_empty() {
        notes.push(format!("unparsed: {}", record.unparsed_lines.join(" | ")));
    }
    (!notes.is_empty()).then(|| notes.join("\n"))
}

/// Insert a rescue log; a second save of the same `source_ts` overwrites the first
pub async fn create_rescue_log(pool: &PgPool, record: &NormalizedRecord, meta: &RecordMeta) -> Result<i64> {
    info!("Creating rescue log for location: '{}'", record.location);

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO rescue_logs
            (location, drop_off_location, direction, rescued_at, items, total_estimated_lbs, raw_text, notes,
             source_ts, channel, user_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         ON CONFLICT (source_ts) DO UPDATE SET
            location = EXCLUDED.location,
            drop_off_location = EXCLUDED.drop_off_location,
            direction = EXCLUDED.direction,
            items = EXCLUDED.items,
            total_estimated_lbs = EXCLUDED.total_estimated_lbs,
            raw_text = EXCLUDED.raw_text,
            notes = EXCLUDED.notes
         RETURNING id",
    )
    .bind(&record.location)
    .bind(&record.drop_off_location)
    .bind(record.direction.to_string())
    .bind(meta.rescued_at.unwrap_or_else(Utc::now))
    .bind(Json(&record.items))
    .bind(record.estimated_total_lbs())
    .bind(&record.raw_text)
    .bind(record_notes(record))
    .bind(&meta.source_ts)
    .bind(&meta.channel)
    .bind(&meta.user_id)
    .fetch_one(pool)
    .await
    .context("Failed to insert rescue log")?;

    info!("Rescue log created with ID: {}", id);
    Ok(id)
}

/// Read a rescue log by ID
pub async fn read_rescue_log(pool: &PgPool, log_id: i64) -> Result<Option<RescueLog>> {
    info!("Reading rescue log with ID: {}", log_id);

    let row = sqlx::query(
        "SELECT id, location, drop_off_location, direction, rescued_at, items, total_estimated_lbs,
                raw_text, notes, source_ts, channel, user_id
         FROM rescue_logs WHERE id = $1",
    )
    .bind(log_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read rescue log")?;

    let Some(row) = row else {
        info!("No rescue log found with ID: {}", log_id);
        return Ok(None);
    };

    let Json(items): Json<Vec<ParsedItem>> = row.try_get("items").context("Failed to decode items")?;
    Ok(Some(RescueLog {
        id: row.try_get("id")?,
        location: row.try_get("location")?,
        drop_off_location: row.try_get("drop_off_location")?,
        direction: row.try_get("direction")?,
        rescued_at: row.try_get("rescued_at")?,
        items,
        total_estimated_lbs: row.try_get("total_estimated_lbs")?,
        raw_text: row.try_get("raw_text")?,
        notes: row.try_get("notes")?,
        source_ts: row.try_get("source_ts")?,
        channel: row.try_get("channel")?,
        user_id: row.try_get("user_id")?,
    }))
}

/// Whether a log exists for a source message timestamp
pub async fn rescue_log_exists(pool: &PgPool, source_ts: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM rescue_logs WHERE source_ts = $1)")
        .bind(source_ts)
        .fetch_one(pool)
        .await
        .context("Failed to check for existing rescue log")?;
    Ok(exists)
}

/// Delete a rescue log
pub async fn delete_rescue_log(pool: &PgPool, log_id: i64) -> Result<bool> {
    info!("Deleting rescue log with ID: {}", log_id);

    let result = sqlx::query("DELETE FROM rescue_logs WHERE id = $1")
        .bind(log_id)
        .execute(pool)
        .await
        .context("Failed to delete rescue log")?;

    if result.rows_affected() > 0 {
        info!("Rescue log deleted successfully with ID: {}", log_id);
        Ok(true)
    } else {
        info!("No rescue log found with ID: {}", log_id);
        Ok(false)
    }
}

/// Postgres-backed [`RecordStore`]
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the schema exists
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        init_database_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn persistence_error(err: anyhow::Error) -> PipelineError {
    PipelineError::Persistence(format!("{err:#}"))
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn save(&self, record: &NormalizedRecord, meta: &RecordMeta) -> Result<String, PipelineError> {
        create_rescue_log(&self.pool, record, meta)
            .await
            .map(|id| id.to_string())
            .map_err(persistence_error)
    }

    async fn is_processed(&self, source_ts: &str) -> Result<bool, PipelineError> {
        rescue_log_exists(&self.pool, source_ts)
            .await
            .map_err(persistence_error)
    }
}
