//! PinLens bridge — page-traffic interception, the cross-context stats
//! channel, and the direct fetch engine.

pub mod config;
pub mod consumer;
pub mod fetch;
pub mod intercept;
pub mod protocol;
pub mod provider;
pub mod retry;
pub mod transport;
pub mod types;

pub use config::{resolve_cache_path, BridgeConfig};
pub use consumer::{StatsConsumer, StatsHandle};
pub use fetch::{DirectFetcher, FetchOutcome, PendingRequests};
pub use intercept::{
    HttpRequest, HttpResponse, HttpTransport, InterceptingTransport, RecordSink, ReqwestTransport,
};
pub use protocol::{validate_delivery, ChannelState, RequestAction, StatsRequester};
pub use provider::StatsProvider;
pub use retry::{with_backoff, with_timeout, FetchFailure};
pub use transport::{Delivery, LinkEndpoint};
pub use types::*;
