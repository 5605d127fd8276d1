//! Read-through cache for the serving payload.
//!
//! The scheduler never writes the cache; after a committed snapshot it only
//! deletes the key, and the next reader rebuilds the payload from the log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{CacheError, ServeError};
use crate::history::{MoodSnapshot, SnapshotLog};

pub const CURRENT_KEY: &str = "moodlight:current";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("cache_hits_total", "Serving reads answered from the cache.");
        describe_counter!("cache_misses_total", "Serving reads rebuilt from the log.");
    });
}

/// Key/value store with per-entry TTL.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn flush_all(&self) -> Result<(), CacheError>;
    fn name(&self) -> &'static str;
}

/// In-process backend; expired entries are dropped on read.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut map = self.entries.lock().await;
        match map.get(key) {
            Some((v, expires)) if Instant::now() < *expires => Ok(Some(v.clone())),
            Some(_) => {
                map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut map = self.entries.lock().await;
        map.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn flush_all(&self) -> Result<(), CacheError> {
        self.entries.lock().await.clear();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(feature = "redis-cache")]
pub use redis_backend::RedisCache;

#[cfg(feature = "redis-cache")]
mod redis_backend {
    use super::*;
    use redis::AsyncCommands;

    pub struct RedisCache {
        client: redis::Client,
    }

    impl RedisCache {
        pub fn new(url: &str) -> Result<Self, CacheError> {
            let client = redis::Client::open(url).map_err(|e| CacheError::Backend(e.to_string()))?;
            Ok(Self { client })
        }

        async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
            self.client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))
        }
    }

    #[async_trait]
    impl CacheBackend for RedisCache {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            let mut conn = self.conn().await?;
            conn.get(key)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))
        }

        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
            let mut conn = self.conn().await?;
            let _: () = conn
                .set_ex(key, value, ttl.as_secs().max(1))
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            let mut conn = self.conn().await?;
            let _: i64 = conn
                .del(key)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
            Ok(())
        }

        async fn flush_all(&self) -> Result<(), CacheError> {
            let mut conn = self.conn().await?;
            let _: () = redis::cmd("FLUSHDB")
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "redis"
        }
    }
}

/// Pick the backend for `redis_url`: Redis when the feature is on and a URL
/// is set, memory otherwise.
pub fn build_backend(redis_url: Option<&str>) -> Arc<dyn CacheBackend> {
    match redis_url {
        Some(url) => redis_or_memory(url),
        None => Arc::new(MemoryCache::new()),
    }
}

#[cfg(feature = "redis-cache")]
fn redis_or_memory(url: &str) -> Arc<dyn CacheBackend> {
    match RedisCache::new(url) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::warn!(target: "cache", error = %e, "redis unavailable, using memory cache");
            Arc::new(MemoryCache::new())
        }
    }
}

#[cfg(not(feature = "redis-cache"))]
fn redis_or_memory(_url: &str) -> Arc<dyn CacheBackend> {
    tracing::warn!(target: "cache", "REDIS_URL set but built without redis-cache; using memory cache");
    Arc::new(MemoryCache::new())
}

/// Body of the current-mood endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPayload {
    pub status: String,
    pub timestamp: String,
    pub sentiment: f64,
    pub category: String,
    pub headlines_analyzed: usize,
    pub next_update_minutes: u64,
    pub cached: bool,
}

impl CurrentPayload {
    pub fn from_snapshot(s: &MoodSnapshot, next_update_minutes: u64) -> Self {
        Self {
            status: "success".to_string(),
            timestamp: s.timestamp.to_rfc3339(),
            sentiment: round_to(s.score, 2),
            category: s.category.as_str().to_string(),
            headlines_analyzed: s.analyzed_count,
            next_update_minutes,
            cached: false,
        }
    }
}

pub fn round_to(v: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (v * f).round() / f
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

pub struct CacheCoordinator {
    backend: Arc<dyn CacheBackend>,
    log: Arc<dyn SnapshotLog>,
    ttl: Duration,
    next_update_minutes: u64,
    // Bumped on every invalidation; a rebuild only stores its payload if no
    // invalidation happened while it was reading the log.
    generation: AtomicU64,
}

impl CacheCoordinator {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        log: Arc<dyn SnapshotLog>,
        ttl: Duration,
        update_interval: Duration,
    ) -> Self {
        ensure_metrics_described();
        Self {
            backend,
            log,
            ttl,
            next_update_minutes: update_interval.as_secs() / 60,
            generation: AtomicU64::new(0),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Serving read: cached payload if present, else rebuilt from the latest snapshot.
    pub async fn current_payload(&self) -> Result<(CurrentPayload, CacheStatus), ServeError> {
        match self.backend.get(CURRENT_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<CurrentPayload>(&raw) {
                Ok(p) => {
                    counter!("cache_hits_total").increment(1);
                    return Ok((p, CacheStatus::Hit));
                }
                Err(e) => {
                    tracing::warn!(target: "cache", error = %e, "undecodable cache entry, rebuilding")
                }
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(target: "cache", error = %e, "cache read failed, reading log"),
        }

        counter!("cache_misses_total").increment(1);
        let gen = self.generation.load(Ordering::SeqCst);
        let snapshot = self
            .log
            .latest()
            .await
            .map_err(ServeError::from)?
            .ok_or(ServeError::NotReady)?;
        let payload = CurrentPayload::from_snapshot(&snapshot, self.next_update_minutes);

        if self.generation.load(Ordering::SeqCst) == gen {
            if let Err(e) = self.store(&payload).await {
                tracing::warn!(target: "cache", error = %e, "cache write failed");
            }
            // An invalidation may have landed between the check and the write.
            if self.generation.load(Ordering::SeqCst) != gen {
                if let Err(e) = self.backend.delete(CURRENT_KEY).await {
                    tracing::warn!(target: "cache", error = %e, "stale cache entry not removed");
                }
            }
        }
        Ok((payload, CacheStatus::Miss))
    }

    async fn store(&self, payload: &CurrentPayload) -> Result<(), CacheError> {
        let raw = serde_json::to_string(payload)?;
        self.backend.set(CURRENT_KEY, &raw, self.ttl).await
    }

    /// Drop the serving key. Called after a committed snapshot.
    pub async fn invalidate(&self) -> Result<(), CacheError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.backend.delete(CURRENT_KEY).await?;
        tracing::info!(target: "cache", key = CURRENT_KEY, "cache invalidated");
        Ok(())
    }

    /// Drop everything in the backend.
    pub async fn flush_all(&self) -> Result<(), CacheError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.backend.flush_all().await?;
        tracing::info!(target: "cache", "cache flushed");
        Ok(())
    }
}
