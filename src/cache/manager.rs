//! Two-tier cache manager
//!
//! Provides a `CacheManager` that keeps entries in memory and mirrors them to JSON
//! files on disk. Entries carry the time they were written; freshness is decided
//! by the caller-supplied TTL at read time and nothing is ever evicted.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::settings::project_dirs;

/// Prefix applied to every key before it reaches the persistent layer
const PERSISTENT_NAMESPACE: &str = "cache:";

/// Wrapper struct for cached data, both in memory and on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry<T> {
    /// The cached data
    data: T,
    /// When the data was cached, in epoch milliseconds
    timestamp: i64,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, now_ms: i64, ttl: Duration) -> bool {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.timestamp) < ttl_ms
    }
}

/// Manages reading and writing cached data
///
/// Reads check the in-memory map first and fall back to the persistent directory
/// (`~/.cache/weatherdash/` on Linux). Persistent reads and writes are best-effort:
/// any I/O or serialization failure degrades that entry to memory-only.
///
/// Cloning is cheap and clones share the same memory layer.
#[derive(Debug, Clone)]
pub struct CacheManager {
    memory: Arc<Mutex<HashMap<String, CacheEntry<Value>>>>,
    /// Directory where cache files are stored, `None` for memory-only caches
    cache_dir: Option<PathBuf>,
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheManager {
    /// Creates a new CacheManager using the XDG-compliant cache directory
    ///
    /// Falls back to a memory-only cache if no cache directory can be determined
    /// (e.g., no home directory).
    pub fn new() -> Self {
        match Self::default_dir() {
            Some(dir) => Self::with_dir(dir),
            None => {
                tracing::warn!("No cache directory available, caching in memory only");
                Self::memory_only()
            }
        }
    }

    /// Platform cache directory, next to the settings file's config directory
    pub fn default_dir() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.cache_dir().to_path_buf())
    }

    /// Creates a new CacheManager with a custom cache directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self {
            memory: Arc::new(Mutex::new(HashMap::new())),
            cache_dir: Some(cache_dir),
        }
    }

    /// Creates a cache without a persistent layer
    pub fn memory_only() -> Self {
        Self {
            memory: Arc::new(Mutex::new(HashMap::new())),
            cache_dir: None,
        }
    }

    /// Returns the persistent directory, if any
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Reads a value that is younger than `ttl`
    ///
    /// Memory hits never touch the disk. A fresh disk entry is promoted into memory;
    /// an expired or unreadable one is ignored and left in place for the next `set`
    /// to overwrite.
    pub fn get<T: DeserializeOwned>(&self, key: &str, ttl: Duration) -> Option<T> {
        let now = now_millis();

        let in_memory = self
            .memory
            .lock()
            .get(key)
            .filter(|entry| entry.is_fresh(now, ttl))
            .map(|entry| entry.data.clone());
        if let Some(data) = in_memory {
            tracing::debug!(key, "cache hit (memory)");
            return decode(key, data);
        }

        let entry = self.read_persistent(key)?;
        if !entry.is_fresh(now, ttl) {
            tracing::debug!(key, "cache entry expired");
            return None;
        }

        tracing::debug!(key, "cache hit (disk)");
        let data = entry.data.clone();
        self.memory.lock().insert(key.to_string(), entry);
        decode(key, data)
    }

    /// Stores a value under `key`, stamped with the current time
    ///
    /// The memory write always happens; the disk write is attempted and any failure
    /// is logged and otherwise ignored.
    pub fn set<T: Serialize>(&self, key: &str, data: &T) {
        let data = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "value could not be serialized, not cached");
                return;
            }
        };

        let entry = CacheEntry {
            data,
            timestamp: now_millis(),
        };

        if let Err(e) = self.write_persistent(key, &entry) {
            tracing::warn!(key, error = %e, "persistent cache write failed");
        }

        self.memory.lock().insert(key.to_string(), entry);
    }

    /// Returns the path to the persistent file for the given key
    fn cache_path(&self, key: &str) -> Option<PathBuf> {
        let name = encode_file_name(&format!("{}{}", PERSISTENT_NAMESPACE, key));
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", name)))
    }

    fn read_persistent(&self, key: &str) -> Option<CacheEntry<Value>> {
        let path = self.cache_path(key)?;
        let content = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(key, error = %e, "corrupt cache entry treated as miss");
                None
            }
        }
    }

    fn write_persistent(&self, key: &str, entry: &CacheEntry<Value>) -> std::io::Result<()> {
        let Some(path) = self.cache_path(key) else {
            return Ok(());
        };
        if let Some(dir) = &self.cache_dir {
            fs::create_dir_all(dir)?;
        }

        let json = serde_json::to_string(entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(path, json)
    }
}

fn decode<T: DeserializeOwned>(key: &str, data: Value) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(key, error = %e, "cached value has unexpected shape");
            None
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Maps an arbitrary key to a portable file name
///
/// ASCII alphanumerics, `-` and `.` pass through; every other byte becomes `_XX`.
fn encode_file_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("_{:02X}", byte));
        }
    }
    out
}
