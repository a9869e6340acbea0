//! Injected-side endpoint: emits the readiness signal, serves fetch-stats
//! requests through the direct fetcher, and forwards records mined off
//! intercepted traffic.

use tokio::sync::mpsc;

use pinlens::PinRecord;

use crate::config::BridgeConfig;
use crate::fetch::DirectFetcher;
use crate::intercept::RecordSink;
use crate::protocol::validate_delivery;
use crate::transport::LinkEndpoint;
use crate::types::{
    BridgeResult, ChannelMessage, ChannelPayload, PinStatsPayload, SOURCE_CONTENT,
};

/// The provider loop. Construction hands back the [`RecordSink`] to plug
/// into an [`InterceptingTransport`](crate::intercept::InterceptingTransport).
pub struct StatsProvider {
    endpoint: LinkEndpoint,
    fetcher: DirectFetcher,
    mined: mpsc::UnboundedReceiver<(String, PinRecord)>,
    page_origin: String,
}

impl StatsProvider {
    pub fn new(
        endpoint: LinkEndpoint,
        fetcher: DirectFetcher,
        config: &BridgeConfig,
    ) -> (Self, RecordSink) {
        let (sink, mined) = mpsc::unbounded_channel();
        let provider = Self {
            endpoint,
            fetcher,
            mined,
            page_origin: config.page_origin.clone(),
        };
        (provider, sink)
    }

    /// Announce readiness, then serve until the consumer side goes away.
    pub async fn run(mut self) -> BridgeResult<()> {
        // The receive loop below is what the ready signal promises; nothing
        // may be emitted before this point.
        self.post(ChannelPayload::InjectorReady)?;
        tracing::info!("provider ready");

        let mut mined_open = true;
        loop {
            tokio::select! {
                delivery = self.endpoint.recv() => {
                    let Some(delivery) = delivery else {
                        tracing::info!("consumer side closed, shutting down");
                        break;
                    };
                    let Some(message) = validate_delivery(
                        &delivery,
                        self.endpoint.window(),
                        &self.page_origin,
                        SOURCE_CONTENT,
                    ) else {
                        continue;
                    };
                    if let ChannelPayload::FetchStats(request) = message.payload {
                        self.serve_fetch(request.ids).await;
                    }
                }
                mined = self.mined.recv(), if mined_open => {
                    match mined {
                        Some((_, record)) => self.forward(record),
                        None => mined_open = false,
                    }
                }
            }
        }

        Ok(())
    }

    async fn serve_fetch(&self, ids: Vec<String>) {
        tracing::debug!(count = ids.len(), "serving fetch-stats batch");
        let outcomes = self.fetcher.fetch_batch(&ids).await;
        for outcome in outcomes {
            if let Some(record) = outcome.record {
                self.forward(record);
            }
        }
    }

    fn forward(&self, record: PinRecord) {
        let payload = ChannelPayload::PinStats(PinStatsPayload {
            id: record.id.clone(),
            record,
        });
        if self.post(payload).is_err() {
            tracing::warn!("record dropped, consumer side closed");
        }
    }

    fn post(&self, payload: ChannelPayload) -> BridgeResult<()> {
        let message = ChannelMessage::from_injected(payload);
        self.endpoint.post(serde_json::to_value(&message)?)
    }
}
