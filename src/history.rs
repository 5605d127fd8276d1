//! history.rs: persisted snapshot log and device bookkeeping (SQLite via sqlx).
//!
//! `sentiment_history` is append-only: one row per committed scheduler cycle,
//! never updated or deleted. Timestamps are stored as UTC milliseconds.
//! `device_statistics` is a write-through upsert table fed by the serving layer.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::classify::{Category, Strength};
use crate::error::PersistenceError;

/// One committed aggregation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodSnapshot {
    /// Assigned by the log on append.
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub score: f64,
    pub category: Category,
    pub analyzed_count: usize,
    pub source_count: usize,
    pub distribution: BTreeMap<Strength, usize>,
    pub response_time_ms: u64,
}

/// Append-only snapshot log.
#[async_trait]
pub trait SnapshotLog: Send + Sync {
    async fn append(&self, snapshot: &MoodSnapshot) -> Result<i64, PersistenceError>;
    /// Row with the greatest timestamp; ties go to the highest id.
    async fn latest(&self) -> Result<Option<MoodSnapshot>, PersistenceError>;
    /// Rows with `from <= timestamp <= to`, ascending, at most `limit`.
    async fn range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<MoodSnapshot>, PersistenceError>;
}

/// Optional device metadata sent along with a read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_name: Option<String>,
    pub mac_address: Option<String>,
    pub firmware_version: Option<String>,
    pub ip_address: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub device_name: Option<String>,
    pub firmware_version: Option<String>,
    pub location: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub total_requests: i64,
    pub minutes_since_last_seen: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total_devices: i64,
    pub active_devices_24h: i64,
    pub total_analyses: i64,
    pub last_update: Option<DateTime<Utc>>,
    pub avg_sentiment_24h: Option<f64>,
    pub avg_sentiment_7d: Option<f64>,
}

pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Open (or create, with `mode=rwc`) the database at `url` and set up the schema.
    pub async fn connect(url: &str) -> Result<Self, PersistenceError> {
        if url.contains(":memory:") {
            return Self::in_memory().await;
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.setup_schema().await?;
        Ok(store)
    }

    /// Private in-memory database. A single pinned connection keeps it alive.
    pub async fn in_memory() -> Result<Self, PersistenceError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.setup_schema().await?;
        Ok(store)
    }

    pub async fn setup_schema(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sentiment_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts_ms INTEGER NOT NULL,
                sentiment_score REAL NOT NULL,
                category TEXT NOT NULL,
                headlines_analyzed INTEGER NOT NULL,
                source_count INTEGER NOT NULL,
                api_response_time_ms INTEGER,
                metadata TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sentiment_history_ts ON sentiment_history (ts_ms)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS device_statistics (
                device_id TEXT PRIMARY KEY,
                device_name TEXT,
                mac_address TEXT,
                firmware_version TEXT,
                ip_address TEXT,
                location TEXT,
                first_seen_ms INTEGER NOT NULL,
                last_seen_ms INTEGER NOT NULL,
                total_requests INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert or refresh a device; `None` fields keep their stored value.
    pub async fn register_device(
        &self,
        device: &DeviceInfo,
        now: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO device_statistics
                (device_id, device_name, mac_address, firmware_version, ip_address, location,
                 first_seen_ms, last_seen_ms, total_requests)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 1)
            ON CONFLICT (device_id) DO UPDATE SET
                device_name = COALESCE(excluded.device_name, device_statistics.device_name),
                mac_address = COALESCE(excluded.mac_address, device_statistics.mac_address),
                firmware_version = COALESCE(excluded.firmware_version, device_statistics.firmware_version),
                ip_address = COALESCE(excluded.ip_address, device_statistics.ip_address),
                location = COALESCE(excluded.location, device_statistics.location),
                last_seen_ms = excluded.last_seen_ms,
                total_requests = device_statistics.total_requests + 1
            "#,
        )
        .bind(&device.device_id)
        .bind(&device.device_name)
        .bind(&device.mac_address)
        .bind(&device.firmware_version)
        .bind(&device.ip_address)
        .bind(&device.location)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Devices seen at or after `since`, most recent first. `now` anchors
    /// `minutes_since_last_seen`.
    pub async fn active_devices(
        &self,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<DeviceRecord>, PersistenceError> {
        let since = since.timestamp_millis();
        let rows = sqlx::query(
            r#"
            SELECT device_id, device_name, firmware_version, location, last_seen_ms, total_requests
            FROM device_statistics
            WHERE last_seen_ms >= ?1
            ORDER BY last_seen_ms DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| -> Result<DeviceRecord, PersistenceError> {
                let last_seen = from_millis(r.try_get("last_seen_ms")?)?;
                let minutes = (now - last_seen).num_milliseconds() as f64 / 60_000.0;
                Ok(DeviceRecord {
                    device_id: r.try_get("device_id")?,
                    device_name: r.try_get("device_name")?,
                    firmware_version: r.try_get("firmware_version")?,
                    location: r.try_get("location")?,
                    last_seen,
                    total_requests: r.try_get("total_requests")?,
                    minutes_since_last_seen: minutes,
                })
            })
            .collect()
    }

    /// Mean score of snapshots at or after `since`; `None` when there are none.
    pub async fn average_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Option<f64>, PersistenceError> {
        let row = sqlx::query(
            "SELECT AVG(sentiment_score) AS avg FROM sentiment_history WHERE ts_ms >= ?1",
        )
        .bind(since.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<Option<f64>, _>("avg")?)
    }

    pub async fn statistics(&self, now: DateTime<Utc>) -> Result<Statistics, PersistenceError> {
        let day_ago = (now - Duration::hours(24)).timestamp_millis();

        let total_devices = self
            .count("SELECT COUNT(*) AS n FROM device_statistics", None)
            .await?;
        let active_devices_24h = self
            .count(
                "SELECT COUNT(*) AS n FROM device_statistics WHERE last_seen_ms >= ?1",
                Some(day_ago),
            )
            .await?;
        let total_analyses = self
            .count("SELECT COUNT(*) AS n FROM sentiment_history", None)
            .await?;

        let row = sqlx::query("SELECT MAX(ts_ms) AS ts FROM sentiment_history")
            .fetch_one(&self.pool)
            .await?;
        let last_update = match row.try_get::<Option<i64>, _>("ts")? {
            Some(ms) => Some(from_millis(ms)?),
            None => None,
        };

        Ok(Statistics {
            total_devices,
            active_devices_24h,
            total_analyses,
            last_update,
            avg_sentiment_24h: self.average_since(now - Duration::hours(24)).await?,
            avg_sentiment_7d: self.average_since(now - Duration::days(7)).await?,
        })
    }

    async fn count(&self, sql: &str, bind: Option<i64>) -> Result<i64, PersistenceError> {
        let mut q = sqlx::query(sql);
        if let Some(v) = bind {
            q = q.bind(v);
        }
        let row = q.fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>("n")?)
    }
}

#[async_trait]
impl SnapshotLog for HistoryStore {
    async fn append(&self, s: &MoodSnapshot) -> Result<i64, PersistenceError> {
        let metadata = json!({
            "sentiment_distribution": s.distribution,
            "worker": "background",
            "timestamp": s.timestamp.to_rfc3339(),
        });
        let res = sqlx::query(
            r#"
            INSERT INTO sentiment_history
                (ts_ms, sentiment_score, category, headlines_analyzed, source_count,
                 api_response_time_ms, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(s.timestamp.timestamp_millis())
        .bind(s.score)
        .bind(s.category.as_str())
        .bind(s.analyzed_count as i64)
        .bind(s.source_count as i64)
        .bind(s.response_time_ms as i64)
        .bind(serde_json::to_string(&metadata)?)
        .execute(&self.pool)
        .await?;

        let id = res.last_insert_rowid();
        tracing::info!(target: "history", id, score = s.score, category = %s.category, "snapshot saved");
        Ok(id)
    }

    async fn latest(&self) -> Result<Option<MoodSnapshot>, PersistenceError> {
        let row = sqlx::query(&format!(
            "{SELECT_SNAPSHOT} ORDER BY ts_ms DESC, id DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        row.map(snapshot_from_row).transpose()
    }

    async fn range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<MoodSnapshot>, PersistenceError> {
        let rows = sqlx::query(&format!(
            "{SELECT_SNAPSHOT} WHERE ts_ms BETWEEN ?1 AND ?2 ORDER BY ts_ms ASC, id ASC LIMIT ?3"
        ))
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(snapshot_from_row).collect()
    }
}

const SELECT_SNAPSHOT: &str = "SELECT id, ts_ms, sentiment_score, category, headlines_analyzed, \
     source_count, api_response_time_ms, metadata FROM sentiment_history";

fn snapshot_from_row(r: SqliteRow) -> Result<MoodSnapshot, PersistenceError> {
    let category: String = r.try_get("category")?;
    let category = Category::parse(&category)
        .ok_or_else(|| PersistenceError::Corrupt(format!("unknown category {category:?}")))?;

    let distribution = match r.try_get::<Option<String>, _>("metadata")? {
        Some(raw) => {
            let meta: serde_json::Value = serde_json::from_str(&raw)?;
            match meta.get("sentiment_distribution") {
                Some(d) => serde_json::from_value(d.clone())?,
                None => BTreeMap::new(),
            }
        }
        None => BTreeMap::new(),
    };

    Ok(MoodSnapshot {
        id: Some(r.try_get("id")?),
        timestamp: from_millis(r.try_get("ts_ms")?)?,
        score: r.try_get("sentiment_score")?,
        category,
        analyzed_count: non_negative(r.try_get("headlines_analyzed")?)?,
        source_count: non_negative(r.try_get("source_count")?)?,
        distribution,
        response_time_ms: r
            .try_get::<Option<i64>, _>("api_response_time_ms")?
            .map(non_negative)
            .transpose()?
            .unwrap_or(0) as u64,
    })
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| PersistenceError::Corrupt(format!("timestamp out of range: {ms}")))
}

fn non_negative(v: i64) -> Result<usize, PersistenceError> {
    usize::try_from(v).map_err(|_| PersistenceError::Corrupt(format!("negative count: {v}")))
}
