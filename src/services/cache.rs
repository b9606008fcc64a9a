// Versioned TTL cache for API responses
//
// Entries are valid while `now - timestamp < ttl` and the stored version matches
// the version the reader expects. Reads that find a stale or mismatched entry
// delete it. No operation here ever returns an error to the caller: storage and
// serialization failures are logged and behave like a miss (reads) or a no-op
// (writes).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
#[cfg(test)]
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::db;
use crate::models::Season;

pub const DEFAULT_TTL: Duration = Duration::from_secs(48 * 60 * 60);
pub const DEFAULT_VERSION: &str = "1.0.0";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One persisted entry; `data` holds the JSON-encoded value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredEntry {
    pub key: String,
    pub data: String,
    /// Creation time, epoch milliseconds
    pub timestamp: i64,
    /// Milliseconds
    pub ttl: i64,
    pub version: String,
}

impl StoredEntry {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms - self.timestamp >= self.ttl
    }

    /// Byte length of the entry serialized as one JSON object
    pub fn serialized_len(&self) -> usize {
        #[derive(Serialize)]
        struct Serialized<'a> {
            key: &'a str,
            data: serde_json::Value,
            timestamp: i64,
            ttl: i64,
            version: &'a str,
        }

        let data = match serde_json::from_str(&self.data) {
            Ok(value) => value,
            Err(_) => serde_json::Value::String(self.data.clone()),
        };

        serde_json::to_string(&Serialized {
            key: &self.key,
            data,
            timestamp: self.timestamp,
            ttl: self.ttl,
            version: &self.version,
        })
        .map(|s| s.len())
        .unwrap_or(self.data.len())
    }
}

/// Storage engine behind the cache store
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError>;
    async fn put(&self, entry: StoredEntry) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
    async fn entries(&self) -> Result<Vec<StoredEntry>, CacheError>;
}

/// Durable backend on the SQLite `cache_entries` table
pub struct SqliteCacheBackend {
    pool: SqlitePool,
}

impl SqliteCacheBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheBackend for SqliteCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        Ok(db::get_cache_entry(&self.pool, key).await?)
    }

    async fn put(&self, entry: StoredEntry) -> Result<(), CacheError> {
        Ok(db::put_cache_entry(&self.pool, &entry).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        db::delete_cache_entry(&self.pool, key).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        db::clear_cache_entries(&self.pool).await?;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<StoredEntry>, CacheError> {
        Ok(db::all_cache_entries(&self.pool).await?)
    }
}

/// Process-local backend; contents vanish with the process
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, entry: StoredEntry) -> Result<(), CacheError> {
        self.entries.write().await.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<StoredEntry>, CacheError> {
        let mut all: Vec<StoredEntry> = self.entries.read().await.values().cloned().collect();
        all.sort_by_key(|e| e.timestamp);
        Ok(all)
    }
}

/// Wall-clock source for entry timestamps
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Logical resources that get cached, one key each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey {
    SeasonListing { season: Season, year: i32 },
    StreamingBatch { season: Season, year: i32 },
    AnimeStreaming { anime_id: i64 },
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::SeasonListing { season, year } => {
                write!(f, "anime-basic-{}-{}", season, year)
            }
            CacheKey::StreamingBatch { season, year } => {
                write!(f, "streaming-batch-{}-{}", season, year)
            }
            CacheKey::AnimeStreaming { anime_id } => write!(f, "streaming-anime-{}", anime_id),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    pub ttl: Option<Duration>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub total_size: usize,
}

pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    default_version: String,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            default_ttl: DEFAULT_TTL,
            default_version: DEFAULT_VERSION.to_string(),
        }
    }

    pub fn with_defaults(mut self, ttl: Duration, version: impl Into<String>) -> Self {
        self.default_ttl = ttl;
        self.default_version = version.into();
        self
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheBackend::new()))
    }

    /// Store `data` under `key`, replacing any previous entry
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, data: &T, options: CacheOptions) {
        let encoded = match serde_json::to_string(data) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!("Cache: failed to serialize data for key \"{}\": {}", key, e);
                return;
            }
        };

        let ttl = options.ttl.unwrap_or(self.default_ttl);
        let entry = StoredEntry {
            key: key.to_string(),
            data: encoded,
            timestamp: self.clock.now_millis(),
            ttl: ttl.as_millis() as i64,
            version: options
                .version
                .unwrap_or_else(|| self.default_version.clone()),
        };

        match self.backend.put(entry).await {
            Ok(()) => tracing::debug!("Cache: stored key \"{}\"", key),
            Err(e) => tracing::warn!("Cache: failed to store key \"{}\": {}", key, e),
        }
    }

    /// Read `key`, returning `None` on a miss, an expired entry or a version mismatch
    pub async fn get<T: DeserializeOwned>(&self, key: &str, expected_version: &str) -> Option<T> {
        let entry = match self.backend.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::debug!("Cache: no entry for key \"{}\"", key);
                return None;
            }
            Err(e) => {
                tracing::warn!("Cache: failed to read key \"{}\": {}", key, e);
                return None;
            }
        };

        let now = self.clock.now_millis();

        if entry.is_expired(now) {
            tracing::debug!("Cache: entry expired for key \"{}\"", key);
            self.delete(key).await;
            return None;
        }

        if entry.version != expected_version {
            tracing::debug!(
                "Cache: version mismatch for key \"{}\" (stored {}, expected {})",
                key,
                entry.version,
                expected_version
            );
            self.delete(key).await;
            return None;
        }

        match serde_json::from_str(&entry.data) {
            Ok(data) => {
                let remaining = Duration::from_millis((entry.ttl - (now - entry.timestamp)) as u64);
                tracing::debug!(
                    "Cache: hit for key \"{}\" ({} minutes remaining)",
                    key,
                    remaining.as_secs() / 60
                );
                Some(data)
            }
            Err(e) => {
                tracing::warn!("Cache: unreadable entry for key \"{}\": {}", key, e);
                self.delete(key).await;
                None
            }
        }
    }

    /// Read with the store's default version
    pub async fn get_current<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let version = self.default_version.clone();
        self.get(key, &version).await
    }

    pub async fn delete(&self, key: &str) {
        match self.backend.delete(key).await {
            Ok(()) => tracing::debug!("Cache: deleted key \"{}\"", key),
            Err(e) => tracing::warn!("Cache: failed to delete key \"{}\": {}", key, e),
        }
    }

    pub async fn clear(&self) {
        match self.backend.clear().await {
            Ok(()) => tracing::info!("Cache: cleared all entries"),
            Err(e) => tracing::warn!("Cache: failed to clear: {}", e),
        }
    }

    /// Delete every expired entry regardless of version; returns how many went
    pub async fn cleanup(&self) -> usize {
        let entries = match self.backend.entries().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cache: failed to scan entries for cleanup: {}", e);
                return 0;
            }
        };

        let now = self.clock.now_millis();
        let mut removed = 0;

        for entry in entries.iter().filter(|e| e.is_expired(now)) {
            match self.backend.delete(&entry.key).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Cache: failed to delete key \"{}\": {}", entry.key, e),
            }
        }

        if removed > 0 {
            tracing::info!("Cache: cleaned up {} expired entries", removed);
        }
        removed
    }

    /// Counts without deleting anything
    pub async fn stats(&self) -> CacheStats {
        let entries = match self.backend.entries().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cache: failed to read stats: {}", e);
                return CacheStats::default();
            }
        };

        let now = self.clock.now_millis();
        CacheStats {
            total_entries: entries.len(),
            expired_entries: entries.iter().filter(|e| e.is_expired(now)).count(),
            total_size: entries.iter().map(StoredEntry::serialized_len).sum(),
        }
    }
}
