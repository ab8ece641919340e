//! Dual-tier memory manager.
//!
//! | Tier       | Backing            | Bound            | Expiry                 |
//! |------------|--------------------|------------------|------------------------|
//! | Short-term | `HashMap` RAM      | `capacity` items | per-entry TTL, absolute |
//! | Long-term  | `HashMap` + JSON   | none             | never                  |
//!
//! Both tiers sit behind one [`RwLock`].  Every operation that can mutate
//! state, including a short-term read that discovers an expired entry, takes
//! the write lock for its whole duration; nothing ever upgrades a read lock.
//!
//! Long-term writes serialize the snapshot under that lock, release it, and
//! write the file on the blocking thread pool.  A separate async mutex keeps
//! snapshots hitting the disk in mutation order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// Default short-term capacity.
pub const DEFAULT_SHORT_TERM_CAPACITY: usize = 1000;

/// Default interval of the background expiry sweep.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

// ═══════════════════════════════════════════════════════════════════════
//  Public types
// ═══════════════════════════════════════════════════════════════════════

/// A stored value with its last-write time and optional TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub key: String,
    pub value: Value,
    /// Time of the last write.  TTL is measured from here.
    pub timestamp: DateTime<Utc>,
    /// Time to live, serialized in milliseconds.
    #[serde(
        default,
        rename = "ttl_ms",
        with = "ttl_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub ttl: Option<Duration>,
}

impl MemoryEntry {
    fn new(key: String, value: Value, ttl: Option<Duration>) -> Self {
        Self {
            key,
            value,
            timestamp: Utc::now(),
            ttl,
        }
    }

    /// Whether `now - timestamp > ttl`.  Entries without a TTL never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        // A timestamp in the future yields a negative age: not expired.
        (now - self.timestamp)
            .to_std()
            .is_ok_and(|age| age > ttl)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Case-insensitive substring match on the key and the rendered value.
    /// `needle` must already be lowercase.
    fn matches(&self, needle: &str) -> bool {
        if self.key.to_lowercase().contains(needle) {
            return true;
        }
        let rendered = match &self.value {
            Value::String(s) => s.to_lowercase(),
            other => other.to_string().to_lowercase(),
        };
        rendered.contains(needle)
    }
}

/// Construction parameters of a [`MemoryManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryConfig {
    /// Maximum number of short-term entries (minimum 1).
    pub short_term_capacity: usize,
    /// TTL applied by [`MemoryManager::set_short_term`] when the caller
    /// gives none.  `None` means such entries never expire.
    pub default_ttl: Option<Duration>,
    /// JSON file holding the long-term tier.
    pub long_term_file: PathBuf,
    /// Interval of the sweep started by [`MemoryManager::spawn_cleanup`].
    pub cleanup_interval: Duration,
}

impl MemoryConfig {
    /// Defaults with the given long-term file.
    pub fn new(long_term_file: impl Into<PathBuf>) -> Self {
        Self {
            short_term_capacity: DEFAULT_SHORT_TERM_CAPACITY,
            default_ttl: Some(Duration::from_secs(60 * 60)),
            long_term_file: long_term_file.into(),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.short_term_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Non-expired short-term entries.
    pub short_term_count: usize,
    pub short_term_capacity: usize,
    pub long_term_count: usize,
    pub short_term_usage_percent: f64,
}

// ═══════════════════════════════════════════════════════════════════════
//  MemoryManager
// ═══════════════════════════════════════════════════════════════════════

struct ShortTermSlot {
    entry: MemoryEntry,
    /// Write sequence number; breaks timestamp ties during eviction.
    seq: u64,
}

#[derive(Default)]
struct MemoryState {
    short_term: HashMap<String, ShortTermSlot>,
    long_term: HashMap<String, MemoryEntry>,
    next_seq: u64,
}

struct MemoryInner {
    config: MemoryConfig,
    state: RwLock<MemoryState>,
    /// Held from a long-term mutation until its snapshot is on disk.
    persist: tokio::sync::Mutex<()>,
}

/// Short-term and long-term key/value memory.
///
/// Cheaply cloneable; clones share the same state.
#[derive(Clone)]
pub struct MemoryManager {
    inner: Arc<MemoryInner>,
}

impl MemoryManager {
    /// Create a manager and load the long-term file if it exists.
    ///
    /// A missing or empty file starts an empty long-term tier.  An unreadable
    /// or malformed file is an error.
    pub fn new(mut config: MemoryConfig) -> StoreResult<Self> {
        config.short_term_capacity = config.short_term_capacity.max(1);
        let long_term = load_long_term(&config.long_term_file)?;

        info!(
            file = %config.long_term_file.display(),
            long_term_entries = long_term.len(),
            short_term_capacity = config.short_term_capacity,
            "memory manager initialised"
        );

        Ok(Self {
            inner: Arc::new(MemoryInner {
                config,
                state: RwLock::new(MemoryState {
                    long_term,
                    ..MemoryState::default()
                }),
                persist: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.inner.config
    }

    // ── short-term ───────────────────────────────────────────────────

    /// Insert or overwrite a short-term entry.  `None` applies the
    /// configured default TTL; a zero `ttl` means the entry never expires.
    /// If the tier then exceeds its capacity, the entry with the oldest
    /// timestamp is evicted.
    pub fn set_short_term(&self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        let key = key.into();
        let ttl = match ttl {
            Some(ttl) => (!ttl.is_zero()).then_some(ttl),
            None => self.inner.config.default_ttl,
        };
        let capacity = self.inner.config.short_term_capacity;

        let mut state = self.write();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.short_term.insert(
            key.clone(),
            ShortTermSlot {
                entry: MemoryEntry::new(key.clone(), value, ttl),
                seq,
            },
        );
        debug!(key = %key, ttl_ms = ttl.map(|t| t.as_millis() as u64), "short_term.set");

        if state.short_term.len() > capacity {
            let oldest = state
                .short_term
                .iter()
                .min_by_key(|(_, slot)| (slot.entry.timestamp, slot.seq))
                .map(|(k, _)| k.clone());
            if let Some(evicted) = oldest {
                state.short_term.remove(&evicted);
                debug!(key = %evicted, capacity, "short_term.evict");
            }
        }
    }

    /// Look up a short-term value.  An expired entry is removed and reported
    /// as absent.
    pub fn get_short_term(&self, key: &str) -> Option<Value> {
        let mut state = self.write();
        let expired = state.short_term.get(key)?.entry.is_expired();
        if expired {
            state.short_term.remove(key);
            debug!(key = %key, "short_term.expired");
            return None;
        }
        state.short_term.get(key).map(|slot| slot.entry.value.clone())
    }

    /// Remove a short-term entry.  Returns whether it existed.
    pub fn delete_short_term(&self, key: &str) -> bool {
        let removed = self.write().short_term.remove(key).is_some();
        if removed {
            debug!(key = %key, "short_term.delete");
        }
        removed
    }

    /// All non-expired short-term entries, most recent first.
    pub fn all_short_term(&self) -> Vec<MemoryEntry> {
        let now = Utc::now();
        let state = self.read();
        let mut entries: Vec<MemoryEntry> = state
            .short_term
            .values()
            .filter(|slot| !slot.entry.is_expired_at(now))
            .map(|slot| slot.entry.clone())
            .collect();
        sort_newest_first(&mut entries);
        entries
    }

    /// Delete every expired short-term entry.  Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut state = self.write();
        let before = state.short_term.len();
        state
            .short_term
            .retain(|_, slot| !slot.entry.is_expired_at(now));
        let removed = before - state.short_term.len();
        if removed > 0 {
            debug!(removed, "short_term.cleanup");
        }
        removed
    }

    /// Run [`cleanup_expired`](Self::cleanup_expired) every
    /// `config.cleanup_interval` until `token` is cancelled.
    pub fn spawn_cleanup(&self, token: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        let period = self.inner.config.cleanup_interval.max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            info!(interval_ms = period.as_millis() as u64, "memory cleanup started");
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        manager.cleanup_expired();
                    }
                }
            }
            info!("memory cleanup stopped");
        })
    }

    // ── long-term ────────────────────────────────────────────────────

    /// Insert or overwrite a long-term entry, then rewrite the whole file.
    ///
    /// On I/O failure the in-memory tier keeps the new value and the error
    /// is returned; the caller may retry.
    pub async fn set_long_term(&self, key: impl Into<String>, value: Value) -> StoreResult<()> {
        let key = key.into();
        let _order = self.inner.persist.lock().await;
        let snapshot = {
            let mut state = self.write();
            state
                .long_term
                .insert(key.clone(), MemoryEntry::new(key.clone(), value, None));
            Snapshot::of(&state.long_term)?
        };
        debug!(key = %key, "long_term.set");
        self.persist(snapshot).await
    }

    pub fn get_long_term(&self, key: &str) -> Option<Value> {
        self.read().long_term.get(key).map(|e| e.value.clone())
    }

    /// Remove a long-term entry and rewrite the file if it existed.
    pub async fn delete_long_term(&self, key: &str) -> StoreResult<bool> {
        let _order = self.inner.persist.lock().await;
        let snapshot = {
            let mut state = self.write();
            if state.long_term.remove(key).is_none() {
                return Ok(false);
            }
            Snapshot::of(&state.long_term)?
        };
        debug!(key = %key, "long_term.delete");
        self.persist(snapshot).await?;
        Ok(true)
    }

    /// All long-term entries, most recent first.
    pub fn all_long_term(&self) -> Vec<MemoryEntry> {
        let mut entries: Vec<MemoryEntry> = self.read().long_term.values().cloned().collect();
        sort_newest_first(&mut entries);
        entries
    }

    // ── queries ──────────────────────────────────────────────────────

    /// Case-insensitive substring search over keys and rendered values.
    ///
    /// Non-expired short-term entries are always searched; the long-term
    /// tier only when `include_long_term` is set.  Results are most recent
    /// first.
    pub fn search(&self, query: &str, include_long_term: bool) -> Vec<MemoryEntry> {
        let needle = query.to_lowercase();
        let now = Utc::now();
        let state = self.read();

        let mut results: Vec<MemoryEntry> = state
            .short_term
            .values()
            .map(|slot| &slot.entry)
            .filter(|e| !e.is_expired_at(now) && e.matches(&needle))
            .cloned()
            .collect();

        if include_long_term {
            results.extend(
                state
                    .long_term
                    .values()
                    .filter(|e| e.matches(&needle))
                    .cloned(),
            );
        }

        sort_newest_first(&mut results);
        results
    }

    pub fn stats(&self) -> MemoryStats {
        let now = Utc::now();
        let capacity = self.inner.config.short_term_capacity;
        let state = self.read();

        let short_term_count = state
            .short_term
            .values()
            .filter(|slot| !slot.entry.is_expired_at(now))
            .count();

        MemoryStats {
            short_term_count,
            short_term_capacity: capacity,
            long_term_count: state.long_term.len(),
            short_term_usage_percent: short_term_count as f64 * 100.0 / capacity as f64,
        }
    }

    // ── private helpers ──────────────────────────────────────────────

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write `snapshot` to the long-term file on the blocking pool.
    async fn persist(&self, snapshot: Snapshot) -> StoreResult<()> {
        let path = self.inner.config.long_term_file.clone();
        tokio::task::spawn_blocking(move || persist_long_term(&path, &snapshot)).await?
    }

    #[cfg(test)]
    fn short_term_resident(&self, key: &str) -> bool {
        self.read().short_term.contains_key(key)
    }
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

fn sort_newest_first(entries: &mut [MemoryEntry]) {
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

// ═══════════════════════════════════════════════════════════════════════
//  Persistence
// ═══════════════════════════════════════════════════════════════════════

fn load_long_term(path: &Path) -> StoreResult<HashMap<String, MemoryEntry>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(file = %path.display(), "no long-term memory file, starting empty");
            return Ok(HashMap::new());
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };

    if text.trim().is_empty() {
        return Ok(HashMap::new());
    }

    let mut entries: HashMap<String, MemoryEntry> = serde_json::from_str(&text)?;
    for (key, entry) in &mut entries {
        if entry.key != *key {
            warn!(key = %key, stored_key = %entry.key, "long-term entry key mismatch, using map key");
            entry.key.clone_from(key);
        }
        entry.ttl = None;
    }
    Ok(entries)
}

/// The long-term tier rendered as JSON, ready to be written.
struct Snapshot {
    json: String,
    entries: usize,
}

impl Snapshot {
    fn of(entries: &HashMap<String, MemoryEntry>) -> StoreResult<Self> {
        Ok(Self {
            json: serde_json::to_string_pretty(entries)?,
            entries: entries.len(),
        })
    }
}

/// Write the full snapshot to a sibling temp file, then rename it over the
/// target.
fn persist_long_term(path: &Path, snapshot: &Snapshot) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, &snapshot.json).map_err(|e| StoreError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;

    debug!(file = %path.display(), entries = snapshot.entries, "long-term memory persisted");
    Ok(())
}

mod ttl_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ttl: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match ttl {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
