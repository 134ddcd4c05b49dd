//! Raw response cache with a TTL
//!
//! Keeps the last successful upstream payload per source so repeated
//! reports within the TTL skip the network, and so an upstream outage can
//! still be served from older data.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

use chrono::Utc;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Config;
use crate::types::{Result, RoastrackError};

#[derive(Debug, Serialize, Deserialize)]
pub struct CachedResponse<T> {
    pub key: String,
    /// Unix timestamp of the fetch
    pub fetched_at: i64,
    pub entries: Vec<T>,
}

#[derive(Serialize)]
struct CachedResponseRef<'a, T> {
    key: &'a str,
    fetched_at: i64,
    entries: &'a [T],
}

impl<T> CachedResponse<T> {
    pub fn is_expired(&self, ttl_secs: i64, now: i64) -> bool {
        now - self.fetched_at > ttl_secs
    }
}

pub struct ResponseCache {
    cache_dir: PathBuf,
    ttl_secs: i64,
}

impl ResponseCache {
    /// Cache under `~/.roastrack/cache`
    pub fn new(ttl_secs: i64) -> Result<Self> {
        let cache_dir = Config::cache_dir()?;
        fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            ttl_secs,
        })
    }

    pub fn with_cache_dir(cache_dir: PathBuf, ttl_secs: i64) -> Self {
        Self {
            cache_dir,
            ttl_secs,
        }
    }

    pub fn cache_path(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.cache_dir.join(format!("{}.json", file_name))
    }

    pub fn is_fresh<T>(&self, cached: &CachedResponse<T>) -> bool {
        !cached.is_expired(self.ttl_secs, Utc::now().timestamp())
    }

    /// Load a cached payload. Missing, unreadable, or corrupted files read
    /// as `None`. Uses a shared lock for concurrent read safety.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<CachedResponse<T>> {
        let path = self.cache_path(key);
        if !path.exists() {
            return None;
        }

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to open response cache");
                return None;
            }
        };

        if let Err(e) = file.lock_shared() {
            warn!(path = %path.display(), error = %e, "failed to acquire cache read lock");
            return None;
        }

        let mut content = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut content);
        let _ = file.unlock();
        if let Err(e) = read {
            warn!(path = %path.display(), error = %e, "failed to read response cache");
            return None;
        }

        match serde_json::from_str::<CachedResponse<T>>(&content) {
            Ok(cached) if cached.key == key => Some(cached),
            Ok(_) => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupted response cache ignored");
                None
            }
        }
    }

    /// Save using atomic write (temp file + rename) with exclusive lock.
    pub fn save<T: Serialize>(&self, key: &str, entries: &[T]) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let cached = CachedResponseRef {
            key,
            fetched_at: Utc::now().timestamp(),
            entries,
        };
        let content = serde_json::to_string(&cached)
            .map_err(|e| RoastrackError::Cache(format!("Serialization failed: {}", e)))?;

        let path = self.cache_path(key);
        let temp_path = path.with_extension("json.tmp");

        {
            let mut file = File::create(&temp_path)
                .map_err(|e| RoastrackError::Cache(format!("Failed to create temp file: {}", e)))?;
            file.write_all(content.as_bytes())
                .map_err(|e| RoastrackError::Cache(format!("Failed to write temp file: {}", e)))?;
            file.sync_all()
                .map_err(|e| RoastrackError::Cache(format!("Failed to sync temp file: {}", e)))?;
        }

        let target = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        target
            .lock_exclusive()
            .map_err(|e| RoastrackError::Cache(format!("Failed to acquire write lock: {}", e)))?;

        fs::rename(&temp_path, &path)
            .map_err(|e| RoastrackError::Cache(format!("Failed to rename temp file: {}", e)))?;

        let _ = target.unlock();
        Ok(())
    }
}
