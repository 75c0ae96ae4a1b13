//! Analysis Result Cache
//!
//! Time-boxed, size-bounded memoization of `(book id, analysis type)` to a
//! finished result. Entries expire 24 hours after insertion by default; at
//! capacity the oldest insertion is evicted first.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::constants::cache::{EXPIRATION_HOURS, MAX_ENTRIES};
use crate::types::{AnalysisResult, AnalysisType};

// =============================================================================
// Clock
// =============================================================================

/// Time source for expiry checks
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|p| p.into_inner())
    }
}

// =============================================================================
// Cache
// =============================================================================

type CacheKey = (String, AnalysisType);

#[derive(Debug, Clone)]
struct CacheEntry {
    result: AnalysisResult,
    inserted_at: DateTime<Utc>,
    access_count: u64,
}

/// Cache statistics
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

impl CacheStats {
    /// Cache hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct AnalysisCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    stats: RwLock<CacheStats>,
    max_entries: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new(MAX_ENTRIES, EXPIRATION_HOURS)
    }
}

impl AnalysisCache {
    pub fn new(max_entries: usize, ttl_hours: u64) -> Self {
        Self::with_clock(max_entries, ttl_hours, Arc::new(SystemClock))
    }

    pub fn with_clock(max_entries: usize, ttl_hours: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
            max_entries: max_entries.max(1),
            ttl: i64::try_from(ttl_hours)
                .ok()
                .and_then(Duration::try_hours)
                .unwrap_or(Duration::MAX),
            clock,
        }
    }

    fn entries(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            tracing::error!("Analysis cache RwLock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn with_stats(&self, f: impl FnOnce(&mut CacheStats)) {
        let mut stats = self.stats.write().unwrap_or_else(|p| p.into_inner());
        f(&mut stats);
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.inserted_at >= self.ttl
    }

    /// Cached result, or `None` when absent or expired. Expired entries are
    /// removed on the way out.
    pub fn get(&self, book_id: &str, analysis_type: AnalysisType) -> Option<AnalysisResult> {
        let now = self.clock.now();
        let key = (book_id.to_string(), analysis_type);
        let mut entries = self.entries();

        let expired = entries.get(&key).map(|e| self.is_expired(e, now));
        let hit = match expired {
            None => None,
            Some(true) => {
                entries.remove(&key);
                debug!(book_id, %analysis_type, "Cache entry expired");
                None
            }
            Some(false) => entries.get_mut(&key).map(|entry| {
                entry.access_count += 1;
                entry.result.clone()
            }),
        };
        drop(entries);

        self.with_stats(|s| {
            if hit.is_some() {
                s.hits += 1
            } else {
                s.misses += 1
            }
        });
        hit
    }

    /// Insert a result, evicting the oldest entry first when a new key would
    /// exceed capacity.
    pub fn put(&self, book_id: &str, analysis_type: AnalysisType, result: AnalysisResult) {
        let key = (book_id.to_string(), analysis_type);
        let mut entries = self.entries();

        let mut evicted = false;
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            evicted = Self::remove_oldest(&mut entries);
        }

        entries.insert(
            key,
            CacheEntry {
                result,
                inserted_at: self.clock.now(),
                access_count: 0,
            },
        );
        drop(entries);

        if evicted {
            self.with_stats(|s| s.evictions += 1);
        }
    }

    fn remove_oldest(entries: &mut HashMap<CacheKey, CacheEntry>) -> bool {
        let oldest = entries
            .iter()
            .min_by_key(|(_, e)| e.inserted_at)
            .map(|(k, _)| k.clone());
        match oldest {
            Some(key) => {
                debug!(book_id = %key.0, analysis_type = %key.1, "Evicting oldest cache entry");
                entries.remove(&key).is_some()
            }
            None => false,
        }
    }

    /// Remove one entry, or every entry of a book when `analysis_type` is
    /// `None`. Returns the number of entries removed.
    pub fn invalidate(&self, book_id: &str, analysis_type: Option<AnalysisType>) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        match analysis_type {
            Some(t) => {
                entries.remove(&(book_id.to_string(), t));
            }
            None => entries.retain(|(id, _), _| id != book_id),
        }
        let removed = before - entries.len();
        drop(entries);

        if removed > 0 {
            self.with_stats(|s| s.invalidations += removed as u64);
        }
        removed
    }

    /// Remove the globally oldest entry by insertion time
    pub fn evict_oldest(&self) -> bool {
        let evicted = Self::remove_oldest(&mut self.entries());
        if evicted {
            self.with_stats(|s| s.evictions += 1);
        }
        evicted
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Halve the cache, keeping the most recently inserted half
    pub fn handle_memory_pressure(&self) -> usize {
        let mut entries = self.entries();
        let keep = entries.len() / 2;

        let mut by_age: Vec<(CacheKey, DateTime<Utc>)> = entries
            .iter()
            .map(|(k, e)| (k.clone(), e.inserted_at))
            .collect();
        // newest first
        by_age.sort_by(|a, b| b.1.cmp(&a.1));

        let removed = by_age.len() - keep;
        for (key, _) in by_age.into_iter().skip(keep) {
            entries.remove(&key);
        }
        drop(entries);

        self.with_stats(|s| s.evictions += removed as u64);
        removed
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| now - e.inserted_at < self.ttl);
        before - entries.len()
    }

    /// How many times an entry has been served
    pub fn access_count(&self, book_id: &str, analysis_type: AnalysisType) -> Option<u64> {
        self.entries()
            .get(&(book_id.to_string(), analysis_type))
            .map(|e| e.access_count)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.len();
        let stats = *self.stats.read().unwrap_or_else(|p| p.into_inner());
        CacheStats { entries, ..stats }
    }
}
