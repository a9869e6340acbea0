//! Bounded, TTL'd, LRU cache of pin records.

use std::collections::HashMap;

use serde::Serialize;

use crate::persist::{PersistedCache, PersistedEntry};
use crate::types::{unix_millis, PinRecord, RecordPatch};

/// Default entry cap.
pub const DEFAULT_MAX_ENTRIES: usize = 5000;

/// Default time-to-live: 24 hours.
pub const DEFAULT_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// A cached record plus its freshness stamps. `timestamp` drives TTL
/// expiry, `last_accessed` drives LRU ranking; the two move independently.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub record: PinRecord,
    pub timestamp: u64,
    pub last_accessed: u64,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_entries: usize,
    pub ttl_ms: u64,
}

/// In-memory record store, bounded by entry count and age.
#[derive(Debug)]
pub struct StatsCache {
    entries: HashMap<String, CacheEntry>,
    max_entries: usize,
    ttl_ms: u64,
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL_MS)
    }
}

impl StatsCache {
    pub fn new(max_entries: usize, ttl_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            ttl_ms,
        }
    }

    /// Insert or overwrite a record, stamping both times to now.
    pub fn set(&mut self, record: PinRecord) {
        let now = unix_millis();
        self.entries.insert(
            record.id.clone(),
            CacheEntry {
                record,
                timestamp: now,
                last_accessed: now,
            },
        );
        self.evict_over_capacity();
    }

    /// Fetch a record if it is still fresh, refreshing its access time.
    /// Reading an expired entry deletes it and reports a miss.
    pub fn get(&mut self, id: &str) -> Option<PinRecord> {
        let now = unix_millis();
        let expired = match self.entries.get(id) {
            Some(entry) => now.saturating_sub(entry.timestamp) > self.ttl_ms,
            None => return None,
        };
        if expired {
            self.entries.remove(id);
            return None;
        }

        let entry = self.entries.get_mut(id)?;
        entry.last_accessed = now;
        Some(entry.record.clone())
    }

    /// TTL semantics of [`get`](Self::get) without touching the access time
    /// or returning the payload.
    pub fn has(&mut self, id: &str) -> bool {
        let now = unix_millis();
        let expired = match self.entries.get(id) {
            Some(entry) => now.saturating_sub(entry.timestamp) > self.ttl_ms,
            None => return false,
        };
        if expired {
            self.entries.remove(id);
            return false;
        }
        true
    }

    /// Merge a partial update into an existing entry; absent ids are a
    /// no-op. Each field group merges shallowly on its own.
    pub fn update(&mut self, id: &str, patch: &RecordPatch) {
        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };
        if let Some(engagement) = &patch.engagement {
            entry.record.engagement.apply(engagement);
        }
        if let Some(details) = &patch.details {
            entry.record.details.apply(details);
        }
        if let Some(external) = &patch.external {
            entry.record.external.apply(external);
        }
        entry.last_accessed = unix_millis();
    }

    /// Drop every entry older than the TTL in one pass. Returns the number
    /// removed.
    pub fn sweep_expired(&mut self) -> usize {
        let now = unix_millis();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_sub(entry.timestamp) <= self.ttl_ms);
        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!(removed, "swept expired cache entries");
        }
        removed
    }

    /// Empty the in-memory map. The persisted copy is the owner's problem.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            max_entries: self.max_entries,
            ttl_ms: self.ttl_ms,
        }
    }

    /// Serialize the whole map for the storage collaborator.
    pub fn snapshot(&self) -> PersistedCache {
        self.entries
            .iter()
            .map(|(id, entry)| {
                (
                    id.clone(),
                    PersistedEntry::Timestamped {
                        record: entry.record.clone(),
                        timestamp: entry.timestamp,
                        last_accessed: entry.last_accessed,
                    },
                )
            })
            .collect()
    }

    /// Replace the map with a persisted snapshot. Entries past the TTL are
    /// dropped; legacy entries get their stamps synthesized to now.
    pub fn load_snapshot(&mut self, snapshot: PersistedCache) {
        let now = unix_millis();
        self.entries.clear();
        for (id, persisted) in snapshot {
            let (record, timestamp, last_accessed) = persisted.into_parts(now);
            if now.saturating_sub(timestamp) > self.ttl_ms {
                continue;
            }
            self.entries.insert(
                id,
                CacheEntry {
                    record,
                    timestamp,
                    last_accessed,
                },
            );
        }
        self.evict_over_capacity();
    }

    /// Remove exactly enough least-recently-accessed entries to get back
    /// under the cap.
    fn evict_over_capacity(&mut self) {
        if self.entries.len() <= self.max_entries {
            return;
        }
        let excess = self.entries.len() - self.max_entries;

        let mut by_access: Vec<(String, u64)> = self
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.last_accessed))
            .collect();
        by_access.sort_by_key(|(_, accessed)| *accessed);

        for (id, _) in by_access.into_iter().take(excess) {
            self.entries.remove(&id);
        }
        tracing::debug!(evicted = excess, "cache over capacity");
    }
}
