//! In-memory render cache.
//!
//! [`RenderCache`] maps [`Fingerprint`]s to rendered images. It is built once
//! and shared by reference (`Arc<RenderCache>`) between all document
//! conversions of a process.
//!
//! Entries live for the lifetime of the cache unless a capacity limit is set
//! with [`RenderCache::with_capacity_limit`], in which case the oldest
//! inserted entry is evicted first.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use crate::{Fingerprint, ImageFormat};

/// A rendered image stored in the cache.
///
/// Entries are immutable: a different input yields a different fingerprint
/// and therefore a new entry.
#[derive(Debug)]
pub struct CacheEntry {
    /// Key this entry was stored under.
    pub fingerprint: Fingerprint,
    /// Rendered image bytes.
    pub bytes: Arc<[u8]>,
    /// When the entry was inserted.
    pub created_at: SystemTime,
    /// Format of `bytes`.
    pub format: ImageFormat,
}

/// Snapshot of cache statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Number of stored entries.
    pub total_entries: usize,
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// `hits / (hits + misses)`, or `0.0` before the first lookup.
    pub hit_rate: f64,
}

#[derive(Default)]
struct Entries {
    map: HashMap<Fingerprint, Arc<CacheEntry>>,
    /// Insertion order, used for capacity eviction.
    order: VecDeque<Fingerprint>,
}

/// Shared in-memory cache of rendered diagrams.
///
/// `lookup` and `insert` are linearizable: both go through one `RwLock`, so a
/// reader never observes a partially written entry. Hit/miss counters are
/// relaxed atomics and only eventually consistent with each other.
///
/// When two renders of the same fingerprint race, the first `insert` wins and
/// later inserts are discarded.
pub struct RenderCache {
    entries: RwLock<Entries>,
    hits: AtomicU64,
    misses: AtomicU64,
    capacity: Option<NonZeroUsize>,
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderCache {
    /// Create an unbounded cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            capacity: None,
        }
    }

    /// Create a cache holding at most `capacity` entries.
    ///
    /// When full, inserting a new entry evicts the oldest inserted one.
    #[must_use]
    pub fn with_capacity_limit(capacity: NonZeroUsize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Look up a rendered image.
    ///
    /// Counts a hit or a miss. A faulted cache always misses.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<Arc<CacheEntry>> {
        let found = match self.entries.read() {
            Ok(entries) => entries.map.get(fingerprint).cloned(),
            Err(_) => {
                tracing::warn!(%fingerprint, "Render cache unavailable, treating lookup as miss");
                None
            }
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%fingerprint, "Render cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%fingerprint, "Render cache miss");
        }
        found
    }

    /// Store a rendered image.
    ///
    /// Returns `true` if the entry was added, `false` if the fingerprint was
    /// already present (the existing entry is kept) or the cache is faulted.
    pub fn insert(
        &self,
        fingerprint: Fingerprint,
        bytes: impl Into<Arc<[u8]>>,
        format: ImageFormat,
    ) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            tracing::warn!(%fingerprint, "Render cache unavailable, dropping insert");
            return false;
        };

        if entries.map.contains_key(&fingerprint) {
            return false;
        }

        if let Some(capacity) = self.capacity {
            while entries.map.len() >= capacity.get() {
                let Some(oldest) = entries.order.pop_front() else {
                    break;
                };
                entries.map.remove(&oldest);
                tracing::debug!(fingerprint = %oldest, "Evicted render cache entry");
            }
        }

        let entry = CacheEntry {
            fingerprint,
            bytes: bytes.into(),
            created_at: SystemTime::now(),
            format,
        };
        entries.map.insert(fingerprint, Arc::new(entry));
        entries.order.push_back(fingerprint);
        true
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        let total_entries = self.entries.read().map_or(0, |entries| entries.map.len());
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        };

        CacheStats {
            total_entries,
            hits,
            misses,
            hit_rate,
        }
    }

    /// Remove all entries and reset counters.
    ///
    /// Clears a poisoned lock as well, so a faulted cache becomes usable again.
    pub fn reset(&self) {
        match self.entries.write() {
            Ok(mut entries) => *entries = Entries::default(),
            Err(poisoned) => {
                *poisoned.into_inner() = Entries::default();
                self.entries.clear_poison();
            }
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Release all cached images at process or job end.
    pub fn dispose(&self) {
        let stats = self.stats();
        tracing::debug!(
            entries = stats.total_entries,
            hits = stats.hits,
            misses = stats.misses,
            "Disposing render cache"
        );
        self.reset();
    }
}
