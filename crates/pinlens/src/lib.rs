//! PinLens — engagement-record mining, bounded caching, and persistence for
//! pin pages.

pub mod cache;
pub mod classify;
pub mod extract;
pub mod persist;
pub mod types;

pub use cache::{CacheEntry, CacheStats, StatsCache, DEFAULT_MAX_ENTRIES, DEFAULT_TTL_MS};
pub use classify::{is_relevant, mine_payload, unwrap_envelope};
pub use extract::{extract_all, extract_record};
pub use persist::{
    FileStore, MemoryStore, PersistedCache, PersistedEntry, StatsStore, CACHE_STORAGE_KEY,
};
pub use types::*;
