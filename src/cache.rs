//! Persistent translation cache with freshness checks.
//!
//! Entries are keyed by a digest of the text *after* partial overrides plus
//! both language tags. There is no locking between writers: two resolves of
//! the same input may both miss and both write, and the last write wins.

use crate::anchor::FreshnessAnchor;
use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Deterministic digest of `(final_text, source_lang, target_lang)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(final_text: &str, source_lang: &str, target_lang: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source_lang.as_bytes());
        hasher.update([0u8]);
        hasher.update(target_lang.as_bytes());
        hasher.update([0u8]);
        hasher.update(final_text.as_bytes());
        let digest = hasher.finalize();
        Self(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted successful translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub translated_text: String,
    pub provider: String,
    /// Unix seconds at which the provider answered
    pub timestamp: i64,
}

impl CacheEntry {
    pub fn new(key: &CacheKey, translated_text: &str, provider: &str, timestamp: i64) -> Self {
        Self {
            key: key.as_str().to_string(),
            translated_text: translated_text.to_string(),
            provider: provider.to_string(),
            timestamp,
        }
    }
}

/// Durable key/value storage for cache entries.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError>;
    async fn store(&self, entry: &CacheEntry) -> Result<(), StoreError>;
}

/// Write `content` to `path` through a temp file in the same directory and
/// an atomic rename, creating parent directories as needed.
pub(crate) async fn write_atomic(path: PathBuf, content: Vec<u8>) -> Result<(), StoreError> {
    tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(&content)?;
        temp.flush()?;
        temp.as_file().sync_all()?;
        temp.persist(&path)?;
        Ok(())
    })
    .await?
}

/// One JSON document per key, sharded by the first two hex digits.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let shard = key.get(..2).unwrap_or("xx");
        self.dir.join(shard).join(format!("{}.json", key))
    }

    /// Delete entries older than `cutoff` (Unix seconds). Returns how many
    /// were removed. Unreadable files are left in place.
    pub async fn prune_older_than(&self, cutoff: i64) -> Result<usize, StoreError> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> Result<usize, StoreError> {
            let mut removed = 0;
            if !dir.exists() {
                return Ok(0);
            }
            for shard in std::fs::read_dir(&dir)? {
                let shard = shard?.path();
                if !shard.is_dir() {
                    continue;
                }
                for file in std::fs::read_dir(&shard)? {
                    let file = file?.path();
                    if file.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    let Ok(raw) = std::fs::read(&file) else { continue };
                    let Ok(entry) = serde_json::from_slice::<CacheEntry>(&raw) else {
                        continue;
                    };
                    if entry.timestamp < cutoff {
                        std::fs::remove_file(&file)?;
                        removed += 1;
                    }
                }
            }
            Ok(removed)
        })
        .await?
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        let raw = match tokio::fs::read(self.path_for(key.as_str())).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        let content = serde_json::to_vec(entry)?;
        write_atomic(self.path_for(&entry.key), content).await
    }
}

/// Cache store held in memory, counting every access.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    loads: AtomicUsize,
    stores: AtomicUsize,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.read().await.get(key.as_str()).cloned()
    }

    /// Number of `load` calls made so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Number of `store` calls made so far.
    pub fn stores(&self) -> usize {
        self.stores.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(self.entries.read().await.get(key.as_str()).cloned())
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        self.stores.fetch_add(1, Ordering::Relaxed);
        self.entries
            .write()
            .await
            .insert(entry.key.clone(), entry.clone());
        Ok(())
    }
}

/// Cache front that decides whether a stored entry may be reused.
#[derive(Clone)]
pub struct FreshnessAwareCache {
    store: Arc<dyn CacheStore>,
    ttl: Option<Duration>,
}

impl FreshnessAwareCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store, ttl: None }
    }

    /// Treat entries older than `ttl` as misses.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Look up `key`. Store failures, stale entries and expired entries are
    /// all reported as a miss.
    pub async fn get(
        &self,
        key: &CacheKey,
        anchor: Option<&dyn FreshnessAnchor>,
    ) -> Option<CacheEntry> {
        let entry = match self.store.load(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read failed for {}, treating as miss: {}", key, e);
                return None;
            }
        };

        if entry.key != key.as_str() || entry.translated_text.trim().is_empty() {
            warn!("Ignoring inconsistent cache entry for {}", key);
            return None;
        }

        if let Some(ttl) = self.ttl {
            let age = chrono::Utc::now().timestamp() - entry.timestamp;
            if age > i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX) {
                debug!("Cache entry {} expired ({}s old)", key, age);
                return None;
            }
        }

        if let Some(anchor) = anchor {
            match anchor.last_modified().await {
                Some(modified) if entry.timestamp >= modified => {}
                Some(modified) => {
                    debug!(
                        "Cache entry {} is stale (cached at {}, content modified at {})",
                        key, entry.timestamp, modified
                    );
                    return None;
                }
                None => {
                    debug!("Freshness anchor unresolvable, not reusing {}", key);
                    return None;
                }
            }
        }

        Some(entry)
    }

    /// Persist `entry`, overwriting any previous one. Failures are logged.
    pub async fn put(&self, entry: &CacheEntry) {
        if let Err(e) = self.store.store(entry).await {
            warn!("Cache write failed for {}: {}", entry.key, e);
        }
    }
}
