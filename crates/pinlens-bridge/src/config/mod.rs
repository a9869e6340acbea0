//! Bridge configuration and cache-path resolution.

use std::path::PathBuf;
use std::time::Duration;

use pinlens::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL_MS};

/// Tunables for the cache, channel, and fetch engine.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Cache entry cap.
    pub max_entries: usize,
    /// Cache time-to-live in milliseconds.
    pub ttl_ms: u64,
    /// Interval between persistence flushes.
    pub flush_interval_ms: u64,
    /// Debounce window for coalescing record requests.
    pub debounce_ms: u64,
    /// Max ids per request batch; equals the fetch window size so one flush
    /// maps to one window.
    pub batch_size: usize,
    /// Steady-state delay between fetch windows.
    pub window_pacing_ms: u64,
    /// Delay after a window that hit rate limiting.
    pub rate_limit_backoff_ms: u64,
    /// Attempts per fetch under the retry policy.
    pub max_attempts: u32,
    /// Per-request timeout budget.
    pub request_timeout_ms: u64,
    /// Base URL of the pin API.
    pub api_base: String,
    /// Origin the channel is pinned to.
    pub page_origin: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl_ms: DEFAULT_TTL_MS,
            flush_interval_ms: 2_000,
            debounce_ms: 300,
            batch_size: 20,
            window_pacing_ms: 100,
            rate_limit_backoff_ms: 1_000,
            max_attempts: 3,
            request_timeout_ms: 10_000,
            api_base: "https://www.pinterest.com".to_string(),
            page_origin: "https://www.pinterest.com".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn window_pacing(&self) -> Duration {
        Duration::from_millis(self.window_pacing_ms)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Resolve the cache file path.
pub fn resolve_cache_path(explicit: Option<&str>) -> String {
    if let Some(path) = explicit {
        return path.to_string();
    }

    if let Ok(env_path) = std::env::var("PINLENS_CACHE") {
        return env_path;
    }

    let cwd_cache = PathBuf::from(".pinlens/cache.json");
    if cwd_cache.exists() {
        return cwd_cache.display().to_string();
    }

    resolve_default_cache_path()
}

fn resolve_default_cache_path() -> String {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    format!("{home}/.pinlens/cache.json")
}
