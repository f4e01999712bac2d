//! Cache log and integrity seal persistence.
//!
//! The log is one JSON file mapping country keys to [`CacheEntry`] records;
//! the seal is a sidecar file holding the hex SHA-256 of the log's exact
//! bytes. Readers trust the log only while the digest matches the seal.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::sha256_hex;
use crate::Result;

pub(crate) const LOG_FILE: &str = "update.json";
pub(crate) const SEAL_FILE: &str = "update.json.sha256";

/// One cached flag: when it was fetched and the digest of its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cached_at: DateTime<Utc>,
    pub content_hash: String,
}

/// Complete description of what is currently cached, keyed by country.
/// A payload file without a log entry is not cached, whatever is on disk.
pub(crate) type CacheLog = BTreeMap<String, CacheEntry>;

pub(crate) fn log_path(dir: &Path) -> PathBuf {
    dir.join(LOG_FILE)
}

pub(crate) fn seal_path(dir: &Path) -> PathBuf {
    dir.join(SEAL_FILE)
}

/// Read the log, trusting it only if the seal matches its bytes exactly.
///
/// Missing log, missing seal, unreadable files, a digest mismatch, or a
/// sealed-but-unparsable log all yield `None`; callers treat an untrusted
/// log as empty.
pub(crate) async fn read_trusted(dir: &Path) -> Option<CacheLog> {
    let log_bytes = tokio::fs::read(log_path(dir)).await.ok()?;
    let seal = tokio::fs::read_to_string(seal_path(dir)).await.ok()?;

    if sha256_hex(&log_bytes) != seal {
        tracing::warn!(
            dir = %dir.display(),
            "cache log does not match its seal, treating cache as empty"
        );
        return None;
    }

    match serde_json::from_slice(&log_bytes) {
        Ok(log) => Some(log),
        Err(e) => {
            tracing::warn!("sealed cache log is not valid JSON: {e}");
            None
        }
    }
}

/// Serialize the log, write it, then write the seal over those exact bytes.
///
/// Order matters: a crash between the two writes leaves a log that fails
/// seal verification, which readers already treat as empty.
pub(crate) async fn write_sealed(dir: &Path, log: &CacheLog) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(log)?;
    tokio::fs::write(log_path(dir), &bytes).await?;
    tokio::fs::write(seal_path(dir), sha256_hex(&bytes)).await?;
    Ok(())
}
