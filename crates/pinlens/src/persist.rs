//! Persisted cache snapshots and the external storage collaborator.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{PinRecord, StatsError, StatsResult};

/// Fixed key under which the entire serialized cache map lives.
pub const CACHE_STORAGE_KEY: &str = "pinlens.stats-cache";

/// One persisted entry. Older installs stored bare records without stamps;
/// those parse as `Legacy` and get a synthesized write time on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PersistedEntry {
    Timestamped {
        record: PinRecord,
        timestamp: u64,
        last_accessed: u64,
    },
    Legacy(PinRecord),
}

impl PersistedEntry {
    /// Split into `(record, timestamp, last_accessed)`, stamping legacy
    /// entries with the supplied time.
    pub fn into_parts(self, now: u64) -> (PinRecord, u64, u64) {
        match self {
            PersistedEntry::Timestamped {
                record,
                timestamp,
                last_accessed,
            } => (record, timestamp, last_accessed),
            PersistedEntry::Legacy(record) => (record, now, now),
        }
    }
}

/// The full persisted shape: record id → entry.
pub type PersistedCache = HashMap<String, PersistedEntry>;

/// External asynchronous key/value service holding persisted state.
///
/// Implementations are expected to be durable across process restarts;
/// [`MemoryStore`] exists for tests and ephemeral sessions.
#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn get(&self, key: &str) -> StatsResult<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> StatsResult<()>;
    async fn remove(&self, key: &str) -> StatsResult<()>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsStore for MemoryStore {
    async fn get(&self, key: &str) -> StatsResult<Option<Value>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StatsError::Storage("memory store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> StatsResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StatsError::Storage("memory store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StatsResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StatsError::Storage("memory store lock poisoned".to_string()))?;
        entries.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON file of key → value.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read_map(&self) -> StatsResult<HashMap<String, Value>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&raw).map_err(StatsError::Json)
    }

    fn write_map(&self, map: &HashMap<String, Value>) -> StatsResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string(map)?;
        std::fs::write(&self.path, serialized)?;
        Ok(())
    }
}

#[async_trait]
impl StatsStore for FileStore {
    async fn get(&self, key: &str) -> StatsResult<Option<Value>> {
        let mut map = self.read_map()?;
        Ok(map.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> StatsResult<()> {
        let mut map = self.read_map().unwrap_or_else(|e| {
            tracing::warn!("unreadable store file, rewriting: {e}");
            HashMap::new()
        });
        map.insert(key.to_string(), value);
        self.write_map(&map)
    }

    async fn remove(&self, key: &str) -> StatsResult<()> {
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}
