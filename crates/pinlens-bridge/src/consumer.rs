//! Content-side endpoint: owns the cache, requests missing records over the
//! channel, and keeps the persisted copy fresh.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use pinlens::{
    CacheStats, PersistedCache, PinRecord, RecordPatch, StatsCache, StatsStore, CACHE_STORAGE_KEY,
};

use crate::config::BridgeConfig;
use crate::protocol::{validate_delivery, RequestAction, StatsRequester};
use crate::transport::{Delivery, LinkEndpoint};
use crate::types::{
    BridgeResult, ChannelMessage, ChannelPayload, FetchStatsPayload, SOURCE_INJECTED,
};

enum Command {
    Request(String),
    Shutdown,
}

/// Cheap cloneable front door to the consumer. Lookups hit the shared cache
/// directly; misses queue a fetch request on the consumer loop.
#[derive(Clone)]
pub struct StatsHandle {
    cache: Arc<Mutex<StatsCache>>,
    store: Arc<dyn StatsStore>,
    commands: mpsc::UnboundedSender<Command>,
}

impl StatsHandle {
    /// Cache lookup. A miss, or a hit on an incomplete record, queues the
    /// id for a direct fetch; whatever is cached is returned either way.
    pub async fn lookup(&self, id: &str) -> Option<PinRecord> {
        let record = self.cache.lock().await.get(id);
        let needs_fetch = record
            .as_ref()
            .map(|record| !record.is_complete())
            .unwrap_or(true);
        if needs_fetch {
            let _ = self.commands.send(Command::Request(id.to_string()));
        }
        record
    }

    /// Merge locally-owned annotation fields into a cached record.
    pub async fn annotate(&self, id: &str, patch: &RecordPatch) {
        self.cache.lock().await.update(id, patch);
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }

    pub async fn list_ids(&self) -> Vec<String> {
        self.cache.lock().await.list_ids()
    }

    /// Drop the in-memory cache; the persisted copy stays.
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }

    /// Drop both the in-memory cache and the persisted copy.
    pub async fn clear_all(&self) -> BridgeResult<()> {
        self.cache.lock().await.clear();
        self.store.remove(CACHE_STORAGE_KEY).await?;
        Ok(())
    }

    /// Ask the consumer loop to flush and exit.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// The consumer loop: receives mined records, batches outgoing requests
/// behind the readiness handshake, and flushes the cache periodically.
pub struct StatsConsumer {
    cache: Arc<Mutex<StatsCache>>,
    store: Arc<dyn StatsStore>,
    endpoint: LinkEndpoint,
    requester: StatsRequester,
    commands: mpsc::UnboundedReceiver<Command>,
    page_origin: String,
    flush_interval: Duration,
    debounce: Duration,
}

impl StatsConsumer {
    pub fn new(
        endpoint: LinkEndpoint,
        store: Arc<dyn StatsStore>,
        config: &BridgeConfig,
    ) -> (Self, StatsHandle) {
        let cache = Arc::new(Mutex::new(StatsCache::new(
            config.max_entries,
            config.ttl_ms,
        )));
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = StatsHandle {
            cache: cache.clone(),
            store: store.clone(),
            commands: tx,
        };
        let consumer = Self {
            cache,
            store,
            endpoint,
            requester: StatsRequester::new(config.batch_size),
            commands: rx,
            page_origin: config.page_origin.clone(),
            flush_interval: config.flush_interval(),
            debounce: config.debounce(),
        };
        (consumer, handle)
    }

    /// Load the persisted snapshot, then process events until the provider
    /// goes away or a shutdown is requested. Always ends with a flush.
    pub async fn run(mut self) -> BridgeResult<()> {
        self.load().await;

        let mut flush_timer = tokio::time::interval(self.flush_interval);
        flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut debounce_deadline: Option<Instant> = None;
        let mut commands_open = true;

        loop {
            tokio::select! {
                delivery = self.endpoint.recv() => {
                    match delivery {
                        Some(delivery) => self.handle_delivery(delivery).await,
                        None => {
                            tracing::info!("provider side closed, shutting down");
                            break;
                        }
                    }
                }
                command = self.commands.recv(), if commands_open => {
                    match command {
                        Some(Command::Request(id)) => {
                            self.enqueue_request(&id, &mut debounce_deadline);
                        }
                        Some(Command::Shutdown) => {
                            tracing::info!("shutdown requested");
                            break;
                        }
                        None => commands_open = false,
                    }
                }
                _ = flush_timer.tick() => self.flush().await,
                _ = maybe_sleep(debounce_deadline) => {
                    debounce_deadline = None;
                    let batch = self.requester.take_buffer();
                    self.send_batch(batch);
                }
            }
        }

        self.flush().await;
        Ok(())
    }

    /// Populate the cache from the storage collaborator. Failures leave the
    /// cache empty; initialization still completes.
    async fn load(&self) {
        match self.store.get(CACHE_STORAGE_KEY).await {
            Ok(Some(value)) => match serde_json::from_value::<PersistedCache>(value) {
                Ok(snapshot) => {
                    let persisted = snapshot.len();
                    let mut cache = self.cache.lock().await;
                    cache.load_snapshot(snapshot);
                    tracing::info!(
                        persisted,
                        live = cache.size(),
                        "cache loaded from storage"
                    );
                }
                Err(e) => tracing::warn!("persisted cache unreadable, starting empty: {e}"),
            },
            Ok(None) => tracing::debug!("no persisted cache found"),
            Err(e) => tracing::warn!("cache load failed, starting empty: {e}"),
        }
    }

    async fn handle_delivery(&mut self, delivery: Delivery) {
        let Some(message) = validate_delivery(
            &delivery,
            self.endpoint.window(),
            &self.page_origin,
            SOURCE_INJECTED,
        ) else {
            return;
        };

        match message.payload {
            ChannelPayload::PinStats(payload) => {
                tracing::debug!(id = %payload.record.id, "caching record from channel");
                self.cache.lock().await.set(payload.record);
            }
            ChannelPayload::InjectorReady => {
                tracing::info!("injector ready, flushing backlog");
                if let Some(backlog) = self.requester.mark_ready() {
                    self.send_batch(backlog);
                }
            }
            ChannelPayload::FetchStats(_) => {
                tracing::debug!("ignoring fetch-stats from the provider side");
            }
        }
    }

    fn enqueue_request(&mut self, id: &str, debounce_deadline: &mut Option<Instant>) {
        match self.requester.request(id) {
            RequestAction::Hold => {}
            RequestAction::Debounce => {
                if debounce_deadline.is_none() {
                    *debounce_deadline = Some(Instant::now() + self.debounce);
                }
            }
            RequestAction::SendNow(ids) => {
                *debounce_deadline = None;
                self.send_batch(ids);
            }
        }
    }

    fn send_batch(&self, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        tracing::debug!(count = ids.len(), "requesting records over the channel");
        let message =
            ChannelMessage::from_content(ChannelPayload::FetchStats(FetchStatsPayload { ids }));
        match serde_json::to_value(&message) {
            Ok(payload) => {
                if self.endpoint.post(payload).is_err() {
                    tracing::warn!("request batch dropped, provider side closed");
                }
            }
            Err(e) => tracing::warn!("failed to encode request batch: {e}"),
        }
    }

    /// Sweep expired entries, then hand the whole map to the storage
    /// collaborator. Failed flushes are dropped; the next one supersedes.
    async fn flush(&self) {
        let snapshot = {
            let mut cache = self.cache.lock().await;
            cache.sweep_expired();
            cache.snapshot()
        };
        let value = match serde_json::to_value(&snapshot) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("cache snapshot failed to serialize: {e}");
                return;
            }
        };
        if let Err(e) = self.store.set(CACHE_STORAGE_KEY, value).await {
            tracing::warn!("cache flush failed: {e}");
        }
    }
}

async fn maybe_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinlens::{Engagement, ExternalMeta, MemoryStore, PinDetails};

    fn make_record(id: &str, repins: u64) -> PinRecord {
        PinRecord {
            id: id.to_string(),
            engagement: Engagement {
                repins,
                ..Engagement::default()
            },
            details: PinDetails {
                image_url: format!("https://i.example/{id}.jpg"),
                ..PinDetails::default()
            },
            external: ExternalMeta::default(),
        }
    }

    fn pin_stats_delivery(record: PinRecord) -> ChannelMessage {
        ChannelMessage::from_injected(ChannelPayload::PinStats(
            crate::types::PinStatsPayload {
                id: record.id.clone(),
                record,
            },
        ))
    }

    fn setup() -> (StatsConsumer, StatsHandle, LinkEndpoint) {
        let config = BridgeConfig {
            page_origin: "https://www.pinterest.com".to_string(),
            ..BridgeConfig::default()
        };
        let (content_end, injected_end) = LinkEndpoint::pair(&config.page_origin);
        let (consumer, handle) =
            StatsConsumer::new(content_end, Arc::new(MemoryStore::new()), &config);
        (consumer, handle, injected_end)
    }

    async fn recv_fetch_stats(endpoint: &mut LinkEndpoint) -> Vec<String> {
        let delivery = endpoint.recv().await.expect("expected a delivery");
        let message: ChannelMessage = serde_json::from_value(delivery.payload).unwrap();
        match message.payload {
            ChannelPayload::FetchStats(payload) => payload.ids,
            other => panic!("expected fetch-stats, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backlog_flushes_as_one_batch_on_ready() {
        let (consumer, handle, mut injected) = setup();
        tokio::spawn(consumer.run());

        // Requested before the handshake: held, nothing sent.
        for id in ["7", "3", "9", "3"] {
            handle.lookup(id).await;
        }
        tokio::task::yield_now().await;

        injected
            .post(
                serde_json::to_value(ChannelMessage::from_injected(
                    ChannelPayload::InjectorReady,
                ))
                .unwrap(),
            )
            .unwrap();

        let ids = recv_fetch_stats(&mut injected).await;
        assert_eq!(ids, vec!["7", "3", "9"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_ready_requests_coalesce_in_debounce_window() {
        let (consumer, handle, mut injected) = setup();
        tokio::spawn(consumer.run());

        injected
            .post(
                serde_json::to_value(ChannelMessage::from_injected(
                    ChannelPayload::InjectorReady,
                ))
                .unwrap(),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        handle.lookup("1").await;
        handle.lookup("2").await;
        handle.lookup("1").await;

        // The debounce window turns three calls into one batch.
        let ids = recv_fetch_stats(&mut injected).await;
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pin_stats_lands_in_cache_and_stops_refetching() {
        let (consumer, handle, injected) = setup();
        tokio::spawn(consumer.run());

        let record = make_record("42", 8);
        injected
            .post(serde_json::to_value(pin_stats_delivery(record.clone())).unwrap())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // repins > 0 means complete: the lookup must not queue a fetch.
        let got = handle.lookup("42").await.unwrap();
        assert_eq!(got.engagement.repins, 8);
        assert_eq!(handle.stats().await.size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incomplete_cached_record_still_requests_fetch() {
        let (consumer, handle, mut injected) = setup();
        tokio::spawn(consumer.run());

        injected
            .post(
                serde_json::to_value(ChannelMessage::from_injected(
                    ChannelPayload::InjectorReady,
                ))
                .unwrap(),
            )
            .unwrap();

        // Reactions-only record: cached, but incomplete.
        let mut record = make_record("42", 0);
        record.engagement.reactions = 12;
        injected
            .post(serde_json::to_value(pin_stats_delivery(record)).unwrap())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let got = handle.lookup("42").await.unwrap();
        assert!(!got.is_complete());

        let ids = recv_fetch_stats(&mut injected).await;
        assert_eq!(ids, vec!["42"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_to_store() {
        let config = BridgeConfig::default();
        let (content_end, _injected_end) = LinkEndpoint::pair(&config.page_origin);
        let store = Arc::new(MemoryStore::new());
        let (consumer, handle) = StatsConsumer::new(content_end, store.clone(), &config);
        let task = tokio::spawn(consumer.run());

        {
            let mut cache = handle.cache.lock().await;
            cache.set(make_record("1", 4));
        }
        handle.shutdown();
        task.await.unwrap().unwrap();

        let value = store.get(CACHE_STORAGE_KEY).await.unwrap().unwrap();
        let snapshot: PersistedCache = serde_json::from_value(value).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_all_removes_persisted_copy() {
        let config = BridgeConfig::default();
        let (content_end, _injected_end) = LinkEndpoint::pair(&config.page_origin);
        let store = Arc::new(MemoryStore::new());
        let (consumer, handle) = StatsConsumer::new(content_end, store.clone(), &config);
        tokio::spawn(consumer.run());

        {
            let mut cache = handle.cache.lock().await;
            cache.set(make_record("1", 4));
        }
        // Let a periodic flush persist the entry first.
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert!(store.get(CACHE_STORAGE_KEY).await.unwrap().is_some());

        handle.clear_all().await.unwrap();
        assert_eq!(handle.stats().await.size, 0);
        assert!(store.get(CACHE_STORAGE_KEY).await.unwrap().is_none());
    }
}
