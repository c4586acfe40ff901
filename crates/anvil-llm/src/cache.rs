//! Response cache
//!
//! Content-addressed cache of model responses. Entries are keyed by a
//! fingerprint of (system prompt, user prompt, model), evicted in strict LRU
//! order once `max_size` is reached, and expire lazily after `ttl` when one
//! is set.
//!
//! When a persistence path is configured the cache is mirrored to a JSON file
//! and rehydrated on open. Writes happen on a dedicated writer thread: an
//! in-memory change only bumps a generation counter and wakes the writer,
//! which coalesces bursts into one snapshot. Persistence is best-effort: I/O
//! failures are logged and never surface to callers.

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Length of the hex fingerprint used as cache key
const KEY_LEN: usize = 32;

/// File format version for the persisted cache
const FILE_VERSION: u32 = 1;

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Entry time-to-live; `None` (or 0 in config) never expires entries
    #[serde(default = "default_ttl", with = "ttl_secs")]
    pub ttl: Option<Duration>,
    /// JSON side file; `None` keeps the cache in memory only
    #[serde(default)]
    pub persist_path: Option<PathBuf>,
}

fn default_max_size() -> usize {
    1000
}

fn default_ttl() -> Option<Duration> {
    Some(Duration::from_secs(24 * 60 * 60))
}

/// TTL as whole seconds, 0 meaning no expiry
mod ttl_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(ttl: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(ttl.map_or(0, |d| d.as_secs()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<u64>::deserialize(d)?;
        Ok(secs.filter(|&s| s > 0).map(Duration::from_secs))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            ttl: default_ttl(),
            persist_path: None,
        }
    }
}

impl CacheConfig {
    /// Create an in-memory configuration
    #[must_use]
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            max_size,
            ttl: Some(ttl),
            persist_path: None,
        }
    }

    /// Keep entries until evicted
    #[must_use]
    pub fn without_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Mirror the cache to `path`
    #[must_use]
    pub fn with_persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    /// Load from `ANVIL_CACHE_MAX_SIZE`, `ANVIL_CACHE_TTL_SECS` (0 disables
    /// expiry) and `ANVIL_CACHE_PATH`, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let max_size = std::env::var("ANVIL_CACHE_MAX_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_max_size);
        let ttl = match std::env::var("ANVIL_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => default_ttl(),
        };
        let persist_path = std::env::var("ANVIL_CACHE_PATH").ok().map(PathBuf::from);

        Self {
            max_size,
            ttl,
            persist_path,
        }
    }
}

/// A cached response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Response text
    pub text: String,
    /// When the entry was written
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        let Some(ttl) = ttl else {
            return false;
        };
        let age = now.signed_duration_since(self.created_at);
        age.to_std().map(|age| age > ttl).unwrap_or(false)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Current number of entries
    pub size: usize,
    /// Maximum number of entries
    pub max_size: usize,
    /// Lookups that returned a value
    pub hits: u64,
    /// Lookups that returned nothing (including expired entries)
    pub misses: u64,
    /// `hits / (hits + misses)`, 0 when there were no lookups
    pub hit_rate: f64,
    /// Entries dropped to make room
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed
    pub expirations: u64,
}

#[derive(Serialize, Deserialize)]
struct PersistedCache {
    version: u32,
    /// Least recently used first
    entries: Vec<PersistedEntry>,
}

#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    key: String,
    #[serde(flatten)]
    entry: CacheEntry,
}

struct Inner {
    entries: LruCache<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    /// Bumped on every change that should reach disk
    generation: u64,
}

impl Inner {
    fn snapshot(&self) -> PersistedCache {
        PersistedCache {
            version: FILE_VERSION,
            entries: self
                .entries
                .iter()
                .rev()
                .map(|(key, entry)| PersistedEntry {
                    key: key.clone(),
                    entry: entry.clone(),
                })
                .collect(),
        }
    }
}

/// The on-disk side of a persisted cache
struct Store {
    path: PathBuf,
    inner: Arc<Mutex<Inner>>,
    /// Generation of the last snapshot written to disk
    written: Mutex<u64>,
}

impl Store {
    /// Write the current entries unless disk is already up to date.
    ///
    /// The entry lock is held only while copying; serialization and I/O run
    /// outside it.
    fn write_latest(&self) {
        let mut written = self.written.lock().unwrap_or_else(|e| e.into_inner());
        let (generation, snapshot) = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.generation <= *written {
                return;
            }
            (inner.generation, inner.snapshot())
        };

        match write_snapshot(&self.path, &snapshot) {
            Ok(()) => {
                *written = generation;
                debug!(path = %self.path.display(), generation, "Response cache persisted");
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to persist response cache")
            }
        }
    }
}

/// Drain change notifications until every sender is gone, writing once per
/// burst and a final time on close.
fn run_writer(store: Arc<Store>, mut changes: UnboundedReceiver<()>) {
    while changes.blocking_recv().is_some() {
        while changes.try_recv().is_ok() {}
        store.write_latest();
    }
    store.write_latest();
    debug!(path = %store.path.display(), "Response cache writer exited");
}

/// Size- and time-bounded response cache
pub struct ResponseCache {
    inner: Arc<Mutex<Inner>>,
    store: Option<Arc<Store>>,
    /// Wakes the writer thread; `None` when not persisting or the thread
    /// could not be started
    changes: Option<UnboundedSender<()>>,
    config: CacheConfig,
}

/// Fingerprint of a (system, user, model) triple.
///
/// SHA-256 over the NUL-separated fields, hex encoded and truncated.
#[must_use]
pub fn cache_key(system: &str, user: &str, model: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(system.as_bytes());
    hasher.update([0u8]);
    hasher.update(user.as_bytes());
    hasher.update([0u8]);
    hasher.update(model.unwrap_or_default().as_bytes());
    let digest = hasher.finalize();

    let mut hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex.truncate(KEY_LEN);
    hex
}

impl ResponseCache {
    /// Open a cache, rehydrating from the persistence file when configured.
    ///
    /// A missing or unreadable file yields an empty cache.
    #[must_use]
    pub fn open(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_size).unwrap_or(NonZeroUsize::MIN);
        let mut entries = LruCache::new(capacity);

        if let Some(path) = &config.persist_path {
            let now = Utc::now();
            let mut loaded = 0usize;
            for item in load_entries(path) {
                if !item.entry.is_expired(config.ttl, now) {
                    entries.put(item.key, item.entry);
                    loaded += 1;
                }
            }
            if loaded > 0 {
                info!(path = %path.display(), entries = entries.len(), "Response cache restored");
            }
        }

        let inner = Arc::new(Mutex::new(Inner {
            entries,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
            generation: 0,
        }));

        let store = config.persist_path.as_ref().map(|path| {
            Arc::new(Store {
                path: path.clone(),
                inner: Arc::clone(&inner),
                written: Mutex::new(0),
            })
        });
        let changes = store.as_ref().and_then(|store| {
            let (tx, rx) = mpsc::unbounded_channel();
            let store = Arc::clone(store);
            match std::thread::Builder::new()
                .name("anvil-cache-writer".to_string())
                .spawn(move || run_writer(store, rx))
            {
                Ok(_) => Some(tx),
                Err(e) => {
                    warn!(error = %e, "Failed to start cache writer; changes persist only on flush");
                    None
                }
            }
        });

        Self {
            inner,
            store,
            changes,
            config,
        }
    }

    /// In-memory cache with the given bounds
    #[must_use]
    pub fn in_memory(max_size: usize, ttl: Duration) -> Self {
        Self::open(CacheConfig::new(max_size, ttl))
    }

    /// Cache configuration
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a response. Expired entries count as misses and are removed.
    pub fn get(&self, system: &str, user: &str, model: Option<&str>) -> Option<String> {
        let key = cache_key(system, user, model);
        let now = Utc::now();

        {
            let mut inner = self.lock();
            let expired = match inner.entries.get(&key) {
                Some(entry) if !entry.is_expired(self.config.ttl, now) => {
                    let text = entry.text.clone();
                    inner.hits += 1;
                    return Some(text);
                }
                Some(_) => true,
                None => false,
            };

            inner.misses += 1;
            if !expired {
                return None;
            }
            inner.entries.pop(&key);
            inner.expirations += 1;
            inner.generation += 1;
            debug!(key = %key, "Cache entry expired");
        }

        self.notify_writer();
        None
    }

    /// Store a response, replacing any previous value for the same key.
    pub fn put(&self, system: &str, user: &str, text: impl Into<String>, model: Option<&str>) {
        let key = cache_key(system, user, model);
        let entry = CacheEntry {
            text: text.into(),
            created_at: Utc::now(),
        };

        {
            let mut inner = self.lock();
            if let Some((old_key, _)) = inner.entries.push(key.clone(), entry) {
                if old_key != key {
                    inner.evictions += 1;
                    debug!(evicted = %old_key, "Cache entry evicted");
                }
            }
            inner.generation += 1;
        }

        self.notify_writer();
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            size: inner.entries.len(),
            max_size: self.config.max_size,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }

    /// Drop every entry and reset counters
    pub fn clear(&self) {
        {
            let mut inner = self.lock();
            inner.entries.clear();
            inner.hits = 0;
            inner.misses = 0;
            inner.evictions = 0;
            inner.expirations = 0;
            inner.generation += 1;
        }

        self.notify_writer();
    }

    /// Reset hit/miss counters, keeping the entries
    pub fn reset_stats(&self) {
        let mut inner = self.lock();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
        inner.expirations = 0;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write pending changes to disk on the calling thread.
    ///
    /// Blocks on file I/O; meant for shutdown and tests. A no-op for
    /// in-memory caches.
    pub fn flush(&self) {
        if let Some(store) = &self.store {
            store.write_latest();
        }
    }

    fn notify_writer(&self) {
        if let Some(changes) = &self.changes {
            // Fails only if the writer thread died
            let _ = changes.send(());
        }
    }
}

fn load_entries(path: &Path) -> Vec<PersistedEntry> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read response cache");
            return Vec::new();
        }
    };

    match serde_json::from_str::<PersistedCache>(&data) {
        Ok(cache) if cache.version == FILE_VERSION => cache.entries,
        Ok(cache) => {
            warn!(version = cache.version, "Ignoring response cache with unknown version");
            Vec::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring corrupt response cache");
            Vec::new()
        }
    }
}

fn write_snapshot(path: &Path, snapshot: &PersistedCache) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_vec(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
}

lazy_static::lazy_static! {
    /// Process-wide response cache
    static ref GLOBAL_CACHE: Arc<ResponseCache> = Arc::new(ResponseCache::open(CacheConfig::from_env()));
}

/// Get the process-wide response cache
#[must_use]
pub fn global_cache() -> Arc<ResponseCache> {
    Arc::clone(&GLOBAL_CACHE)
}
