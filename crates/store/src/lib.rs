//! Durable, tamper-evident cache for fetched flag images.
//!
//! One PNG payload per country key plus a JSON log of what was cached and
//! when, sealed by a sidecar SHA-256 digest. Readers re-validate the seal on
//! every lookup; a log that does not match its seal is treated as empty.

mod digest;
mod log;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;

use crate::digest::sha256_hex;

pub use crate::log::CacheEntry;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),
    #[error("cache i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache log serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Cached entries older than this are expired. Seven days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(604_800);

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub dir: PathBuf,
    pub ttl: Duration,
}

impl StoreConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Platform data directory for cached flags: `<data_dir>/flagfinder/flags`.
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("flagfinder").join("flags"))
}

pub struct FlagStore {
    config: StoreConfig,
}

impl FlagStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    fn image_path(&self, key: &str) -> PathBuf {
        self.config.dir.join(format!("{key}.png"))
    }

    /// Look up a cached flag. Absence is an expected result, never an error:
    /// a missing or tampered log, an unknown key, a missing or corrupted
    /// payload, and an expired entry all come back as `None`.
    ///
    /// The log and seal are re-read from disk on every call; nothing is
    /// cached in memory, so edits by external processes take effect on the
    /// next lookup.
    pub async fn get(&self, key: &str) -> Option<(Vec<u8>, CacheEntry)> {
        if !valid_key(key) {
            return None;
        }
        let log = log::read_trusted(&self.config.dir).await?;
        let entry = log.get(key)?.clone();

        let bytes = tokio::fs::read(self.image_path(key)).await.ok()?;
        if sha256_hex(&bytes) != entry.content_hash {
            tracing::warn!(
                country = key,
                "cached image does not match its recorded hash"
            );
            return None;
        }

        let age = Utc::now()
            .signed_duration_since(entry.cached_at)
            .num_seconds();
        if age > self.config.ttl.as_secs() as i64 {
            tracing::debug!(country = key, age_secs = age, "cached flag has expired");
            return None;
        }

        Some((bytes, entry))
    }

    /// Store a fetched flag: write the payload, then rewrite the log with
    /// this entry inserted, then reseal. A later `put` for the same key
    /// supersedes the earlier entry.
    ///
    /// If the existing log fails seal verification the new log is rebuilt
    /// from this entry alone; previously cached keys become misses until
    /// refetched.
    pub async fn put(&self, key: &str, image: &[u8]) -> Result<CacheEntry> {
        if !valid_key(key) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        tokio::fs::create_dir_all(&self.config.dir).await?;
        tokio::fs::write(self.image_path(key), image).await?;

        let mut log = log::read_trusted(&self.config.dir).await.unwrap_or_default();
        let entry = CacheEntry {
            cached_at: Utc::now(),
            content_hash: sha256_hex(image),
        };
        log.insert(key.to_string(), entry.clone());
        log::write_sealed(&self.config.dir, &log).await?;

        tracing::info!(country = key, bytes = image.len(), "cached flag image");
        Ok(entry)
    }
}

/// Keys become payload filenames, so anything that could leave the cache
/// directory is rejected.
fn valid_key(key: &str) -> bool {
    !key.is_empty() && key != ".." && !key.contains(['/', '\\'])
}
