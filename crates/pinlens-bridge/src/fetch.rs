//! Direct pin fetches: authenticated detail requests, windowed batching,
//! and rate-limit backoff.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;

use pinlens::{classify, extract_record, unix_millis, PinRecord};

use crate::config::BridgeConfig;
use crate::retry::{with_backoff, with_timeout, FetchFailure};
use crate::types::BridgeResult;

/// Browser-shaped user agent; the detail endpoint rejects obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Outcome of a single direct fetch. Rate limiting is a first-class
/// outcome, not an error; it feeds the per-window backoff.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub record: Option<PinRecord>,
    pub rate_limited: bool,
}

/// Ids already sent to the detail endpoint. Claimed when a fetch starts and
/// held on success; 429s and transport failures release the id so a later
/// call can retry it.
#[derive(Debug, Default, Clone)]
pub struct PendingRequests(Arc<Mutex<HashSet<String>>>);

impl PendingRequests {
    /// Claim an id; false if it is already claimed.
    pub fn try_claim(&self, id: &str) -> bool {
        if let Ok(mut ids) = self.0.lock() {
            ids.insert(id.to_string())
        } else {
            false
        }
    }

    pub fn release(&self, id: &str) {
        if let Ok(mut ids) = self.0.lock() {
            ids.remove(id);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.lock().map(|ids| ids.contains(id)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|ids| ids.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Issues supplementary detail requests when passive interception does not
/// yield complete records.
pub struct DirectFetcher {
    client: reqwest::Client,
    base_url: String,
    window_size: usize,
    window_pacing: Duration,
    rate_limit_backoff: Duration,
    request_timeout: Duration,
    max_attempts: u32,
    pending: PendingRequests,
}

impl DirectFetcher {
    pub fn new(config: &BridgeConfig) -> BridgeResult<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            window_size: config.batch_size,
            window_pacing: config.window_pacing(),
            rate_limit_backoff: config.rate_limit_backoff(),
            request_timeout: config.request_timeout(),
            max_attempts: config.max_attempts,
            pending: PendingRequests::default(),
        })
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Fetch one pin's detail record. Skips ids already claimed; a single
    /// attempt, no retry policy.
    pub async fn fetch_one(&self, id: &str) -> FetchOutcome {
        if !self.pending.try_claim(id) {
            tracing::debug!(id, "fetch already issued, skipping");
            return FetchOutcome::default();
        }
        self.resolve(id, self.fetch_detail(id).await)
    }

    /// Like [`fetch_one`](Self::fetch_one), with the standard retry policy
    /// wrapped around transport failures. Rate limiting passes through
    /// untouched; the batch engine owns that tier of backoff.
    pub async fn fetch_one_with_retry(&self, id: &str) -> FetchOutcome {
        if !self.pending.try_claim(id) {
            tracing::debug!(id, "fetch already issued, skipping");
            return FetchOutcome::default();
        }
        let result = with_backoff(|| self.fetch_detail(id), self.max_attempts).await;
        self.resolve(id, result)
    }

    fn resolve(&self, id: &str, result: Result<FetchOutcome, FetchFailure>) -> FetchOutcome {
        match result {
            Ok(outcome) => {
                if outcome.rate_limited {
                    self.pending.release(id);
                }
                outcome
            }
            Err(failure) => {
                tracing::debug!(id, "direct fetch failed: {failure}");
                self.pending.release(id);
                FetchOutcome::default()
            }
        }
    }

    async fn fetch_detail(&self, id: &str) -> Result<FetchOutcome, FetchFailure> {
        let options = serde_json::json!({
            "options": {
                "id": id,
                "field_set_key": "detailed",
                "fetch_visual_search_objects": true
            },
            "context": {}
        });

        let request = self
            .client
            .get(format!("{}/resource/PinResource/get/", self.base_url))
            .query(&[
                ("source_url", format!("/pin/{id}/")),
                ("data", options.to_string()),
                ("_", unix_millis().to_string()),
            ])
            .header("Accept", "application/json")
            .header("X-Pinterest-PWS-Handler", "www/pin/[id].js")
            .header("X-Requested-With", "XMLHttpRequest");

        let response = with_timeout(self.request_timeout, async {
            request.send().await.map_err(FetchFailure::from)
        })
        .await?;

        let status = response.status().as_u16();
        if status == 429 {
            tracing::warn!(id, "rate limited by the pin API");
            return Ok(FetchOutcome {
                record: None,
                rate_limited: true,
            });
        }
        if !(200..300).contains(&status) {
            tracing::debug!(id, status, "detail request rejected");
            return Ok(FetchOutcome::default());
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchFailure::Network(e.to_string()))?;

        let payload = classify::unwrap_envelope(&body).unwrap_or(&body);
        let record = extract_record(payload);
        if record.is_none() {
            tracing::debug!(id, "detail response carried no extractable record");
        }

        Ok(FetchOutcome {
            record,
            rate_limited: false,
        })
    }

    /// Fetch a batch of ids in concurrency-capped windows.
    ///
    /// Each window runs fully concurrently and the window boundary is a
    /// strict barrier. A rate-limited outcome anywhere in a window delays
    /// the next window by the backoff interval; otherwise the steady-state
    /// pacing delay applies.
    pub async fn fetch_batch(&self, ids: &[String]) -> Vec<FetchOutcome> {
        let mut outcomes = Vec::with_capacity(ids.len());
        let mut windows = ids.chunks(self.window_size.max(1)).peekable();

        while let Some(window) = windows.next() {
            let results = join_all(window.iter().map(|id| self.fetch_one_with_retry(id))).await;
            let rate_limited = results.iter().any(|outcome| outcome.rate_limited);
            outcomes.extend(results);

            if windows.peek().is_some() {
                let delay = if rate_limited {
                    tracing::warn!("window hit rate limiting, backing off");
                    self.rate_limit_backoff
                } else {
                    self.window_pacing
                };
                tokio::time::sleep(delay).await;
            }
        }

        outcomes
    }
}
