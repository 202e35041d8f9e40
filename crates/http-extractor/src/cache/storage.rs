//! Cache storage adapters.
//!
//! Storages own expiry at read time: an entry whose `expires_at` has passed is
//! never handed back, whatever the strategy that produced it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use super::CacheEntry;
use super::clock::{Clock, SystemClock};
use crate::error::StorageError;

/// Persists and retrieves cache entries by key.
///
/// Implementations must tolerate concurrent readers and writers; on a key
/// collision the last write wins.
#[async_trait]
pub trait CacheStorage: Send + Sync + std::fmt::Debug {
    /// Store `entry` under `key`, replacing any previous entry.
    async fn store(&self, key: &str, entry: CacheEntry) -> Result<(), StorageError>;

    /// Entry for `key`, or `None` if absent or expired.
    async fn fetch(&self, key: &str) -> Result<Option<CacheEntry>, StorageError>;
}

/// Evicts moka entries once their own TTL has elapsed.
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl())
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl())
    }
}

/// In-memory storage backed by a bounded moka cache.
#[derive(Clone)]
pub struct MemoryStorage {
    cache: Cache<String, CacheEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryStorage {
    /// Create a store holding at most `max_capacity` entries.
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self::with_clock(max_capacity, Arc::new(SystemClock))
    }

    /// Create a store that checks expiry against `clock`.
    #[must_use]
    pub fn with_clock(max_capacity: u64, clock: Arc<dyn Clock>) -> Self {
        let cache = Cache::builder().max_capacity(max_capacity).expire_after(EntryExpiry).build();
        Self { cache, clock }
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage").field("entries", &self.cache.entry_count()).finish()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn store(&self, key: &str, entry: CacheEntry) -> Result<(), StorageError> {
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        let Some(entry) = self.cache.get(key).await else {
            return Ok(None);
        };
        if entry.is_expired_at(self.clock.now()) {
            return Ok(None);
        }
        Ok(Some(entry))
    }
}

/// One JSON file per entry under a directory.
///
/// Writes land in a uniquely named temp file that is renamed over the target,
/// so readers never observe a partial entry.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileStorage {
    /// Store entries under `dir`, created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(dir, Arc::new(SystemClock))
    }

    /// Store entries under `dir`, checking expiry against `clock`.
    #[must_use]
    pub fn with_clock(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self { dir: dir.into(), clock }
    }

    /// Directory holding the entries.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl CacheStorage for FileStorage {
    async fn store(&self, key: &str, entry: CacheEntry) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let encoded = serde_json::to_vec(&entry)?;
        let tmp = self.dir.join(format!(".{key}.{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, encoded).await?;

        if let Err(e) = tokio::fs::rename(&tmp, self.entry_path(key)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: CacheEntry = serde_json::from_slice(&raw)?;
        if entry.is_expired_at(self.clock.now()) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::debug!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove expired cache entry"
                ),
            }
            return Ok(None);
        }
        Ok(Some(entry))
    }
}
