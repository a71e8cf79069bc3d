//! Document store for harvested records.
//!
//! SQLite-backed. Records are keyed by a deterministic document id derived
//! from the identity URL, so re-scraping the same post is an insert-if-absent
//! no-op here regardless of what the harvester's per-run ledger saw.
//! Status lifecycle: `pending` → `processed` | `error`.

mod sink;

pub use sink::StoreSink;

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_128;

use crate::error::HarvestResult;
use crate::harvest::{ContentRecord, record::now_iso};

/// Deterministic document id for an identity URL.
pub fn doc_id(url: &str) -> String {
    format!("{:032x}", xxh3_128(url.as_bytes()))
}

/// Where the store connection string came from. One resolution routine with
/// an explicit, ordered source list; everything downstream depends on its
/// single result type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSource {
    Explicit,
    Environment,
    Default,
}

#[derive(Debug, Clone)]
pub struct StoreTarget {
    pub url: String,
    pub source: StoreSource,
}

/// Resolve the store connection target.
///
/// Priority order:
/// 1. explicit value handed in by the caller
/// 2. `HARVEST_DB` environment variable
/// 3. local default file `harvest.db`
pub fn resolve_store_target(explicit: Option<&str>) -> StoreTarget {
    if let Some(value) = explicit.map(str::trim).filter(|v| !v.is_empty()) {
        return StoreTarget {
            url: to_sqlite_url(value),
            source: StoreSource::Explicit,
        };
    }
    if let Some(value) = std::env::var("HARVEST_DB")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    {
        return StoreTarget {
            url: to_sqlite_url(&value),
            source: StoreSource::Environment,
        };
    }
    StoreTarget {
        url: to_sqlite_url("harvest.db"),
        source: StoreSource::Default,
    }
}

fn to_sqlite_url(value: &str) -> String {
    if value.contains("://") || value.starts_with("sqlite:") {
        value.to_string()
    } else {
        // Bare paths get the rwc mode so a fresh deployment creates its file.
        format!("sqlite://{value}?mode=rwc")
    }
}

/// A pending record as read back for analysis.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub doc_id: String,
    pub url: String,
    pub raw_text: String,
}

pub struct HarvestStore {
    pool: SqlitePool,
}

impl HarvestStore {
    /// Connect and ensure the schema exists.
    pub async fn connect(target: &StoreTarget) -> HarvestResult<Self> {
        info!(url = %target.url, source = ?target.source, "Connecting to harvest store");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&target.url)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS raw_posts (
                doc_id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                target_url TEXT,
                raw_text TEXT NOT NULL,
                comments TEXT NOT NULL DEFAULT '[]',
                comment_count INTEGER NOT NULL DEFAULT 0,
                source_strategy TEXT NOT NULL,
                scraped_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                analysis TEXT,
                processed_at TEXT
            )
            "#,
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_raw_posts_status ON raw_posts(status)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// Insert a record if its document id is not already present.
    ///
    /// Returns the document id either way: duplicate detection at this layer
    /// is keyed by id, independent of the harvester's per-run ledger.
    pub async fn upsert_record(&self, record: &ContentRecord) -> HarvestResult<String> {
        let id = doc_id(&record.url);
        let comments = serde_json::to_string(&record.comments).unwrap_or_else(|_| "[]".into());

        let result = sqlx::query(
            r#"
            INSERT INTO raw_posts
                (doc_id, url, target_url, raw_text, comments, comment_count,
                 source_strategy, scraped_at, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending')
            ON CONFLICT(doc_id) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(&record.url)
        .bind(&record.target_url)
        .bind(&record.raw_text)
        .bind(&comments)
        .bind(record.comment_count as i64)
        .bind(record.source_strategy.as_str())
        .bind(&record.scraped_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(doc_id = %id, "Record already stored, skipping");
        }
        Ok(id)
    }

    /// Fetch up to `limit` records still awaiting analysis.
    pub async fn pending_records(&self, limit: u32) -> HarvestResult<Vec<StoredRecord>> {
        let rows = sqlx::query(
            "SELECT doc_id, url, raw_text FROM raw_posts WHERE status = 'pending' ORDER BY rowid LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| StoredRecord {
                doc_id: row.get("doc_id"),
                url: row.get("url"),
                raw_text: row.get("raw_text"),
            })
            .collect())
    }

    /// Write an analysis result (or lack of one) back to a record.
    pub async fn mark_processed(
        &self,
        doc_id: &str,
        analysis: Option<&serde_json::Value>,
        status: &str,
    ) -> HarvestResult<()> {
        let analysis_text = analysis.map(|value| value.to_string());
        sqlx::query(
            "UPDATE raw_posts SET status = ?, analysis = ?, processed_at = ? WHERE doc_id = ?",
        )
        .bind(status)
        .bind(analysis_text)
        .bind(now_iso())
        .bind(doc_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Row status for a document id, when present.
    pub async fn status_of(&self, doc_id: &str) -> HarvestResult<Option<String>> {
        let row = sqlx::query("SELECT status FROM raw_posts WHERE doc_id = ?")
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("status")))
    }
}
